//! Git repository modules.
//!
//! The module's target folder is a fresh clone of the declared repository,
//! checked out at the declared ref when one is given. Clone failures are
//! usually transient network problems and retryable; a checkout failure
//! means the ref does not exist and retrying cannot help.

use std::path::{Path, PathBuf};

use crate::core::DownloadError;
use crate::git::GitCommand;

#[derive(Debug)]
pub struct GitModule {
    name: String,
    url: String,
    reference: Option<String>,
    install_path: Option<String>,
    env_root: PathBuf,
    cache_folder: PathBuf,
}

impl GitModule {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        reference: Option<String>,
        install_path: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            reference,
            install_path,
            env_root: PathBuf::new(),
            cache_folder: PathBuf::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The declared ref doubles as the version recorded in the marker file.
    pub fn version(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn set_env_root(&mut self, root: &Path) {
        self.env_root = root.to_path_buf();
    }

    /// Git modules never touch the archive cache, but the slot is bound
    /// like everyone else's so the path plumbing stays uniform.
    pub fn set_cache_folder(&mut self, slot: PathBuf) {
        self.cache_folder = slot;
    }

    pub fn target_folder(&self) -> PathBuf {
        super::resolve_target(&self.env_root, self.install_path.as_deref(), &self.name)
    }

    pub async fn download(&mut self) -> Result<(), DownloadError> {
        let target = self.target_folder();

        // An earlier failed attempt may have left a partial clone behind;
        // git refuses to clone into a non-empty directory.
        let _ = tokio::fs::remove_dir_all(&target).await;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let clone = GitCommand::new()
            .args(["clone", "--quiet", self.url.as_str()])
            .args([target.to_string_lossy().into_owned()])
            .output()
            .await
            .map_err(|e| DownloadError::Git {
                operation: "clone",
                url: self.url.clone(),
                stderr: e.to_string(),
            })?;
        if !clone.status_success {
            return Err(DownloadError::Git {
                operation: "clone",
                url: self.url.clone(),
                stderr: clone.stderr.trim().to_string(),
            });
        }

        if let Some(reference) = &self.reference {
            let checkout = GitCommand::new()
                .args(["checkout", "--quiet", reference.as_str()])
                .current_dir(&target)
                .output()
                .await
                .map_err(|e| DownloadError::Git {
                    operation: "checkout",
                    url: self.url.clone(),
                    stderr: e.to_string(),
                })?;
            if !checkout.status_success {
                return Err(DownloadError::RefNotFound {
                    reference: reference.clone(),
                    url: self.url.clone(),
                    stderr: checkout.stderr.trim().to_string(),
                });
            }

            super::write_version_marker(&target, reference).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_ref_is_the_version() {
        let m = GitModule::new(
            "acme/widgets",
            "https://example.test/widgets.git",
            Some("v2.1.0".into()),
            None,
        );
        assert_eq!(m.version(), Some("v2.1.0"));
        assert_eq!(m.name(), "acme/widgets");
    }

    #[test]
    fn target_uses_leaf_of_name() {
        let mut m = GitModule::new("acme/widgets", "https://example.test/w.git", None, None);
        m.set_env_root(Path::new("/env"));
        assert_eq!(m.target_folder(), PathBuf::from("/env/modules/widgets"));
    }
}
