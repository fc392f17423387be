//! Puppet Forge release modules.
//!
//! Resolution goes through the Forge v3 API: a pinned version hits
//! `/v3/releases/<author>-<name>-<version>` directly, an unpinned
//! declaration asks `/v3/modules/<author>-<name>` for the current release.
//! The release's `file_uri` points at the tar.gz artifact, which is fetched
//! through the archive cache and unpacked into the target folder.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::{blob_path, store_response};
use crate::core::DownloadError;

/// Default Forge API endpoint; a `forge` directive in the Puppetfile
/// overrides it.
pub const DEFAULT_FORGE_URL: &str = "https://forgeapi.puppet.com";

#[derive(Debug)]
pub struct ForgeModule {
    name: String,
    version: Option<String>,
    forge_url: String,
    install_path: Option<String>,
    env_root: PathBuf,
    cache_folder: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ForgeRelease {
    version: String,
    file_uri: String,
}

#[derive(Debug, Deserialize)]
struct ForgeModuleInfo {
    current_release: ForgeRelease,
}

impl ForgeModule {
    pub fn new(
        name: impl Into<String>,
        version: Option<String>,
        install_path: Option<String>,
        forge_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            forge_url: forge_url.into(),
            install_path,
            env_root: PathBuf::new(),
            cache_folder: PathBuf::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn set_env_root(&mut self, root: &Path) {
        self.env_root = root.to_path_buf();
    }

    pub fn set_cache_folder(&mut self, slot: PathBuf) {
        self.cache_folder = slot;
    }

    pub fn target_folder(&self) -> PathBuf {
        super::resolve_target(&self.env_root, self.install_path.as_deref(), &self.name)
    }

    /// The Forge addresses releases as `author-name`, regardless of whether
    /// the Puppetfile wrote `author/name`.
    fn slug(&self) -> String {
        self.name.replace('/', "-")
    }

    async fn resolve_release(
        &self,
        client: &reqwest::Client,
    ) -> Result<ForgeRelease, DownloadError> {
        let url = match &self.version {
            Some(version) => format!("{}/v3/releases/{}-{}", self.forge_url, self.slug(), version),
            None => format!("{}/v3/modules/{}", self.forge_url, self.slug()),
        };

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|source| DownloadError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(match &self.version {
                Some(version) => DownloadError::VersionNotFound {
                    name: self.name.clone(),
                    version: version.clone(),
                },
                None => DownloadError::ModuleNotFound {
                    name: self.name.clone(),
                },
            });
        }
        if !status.is_success() {
            return Err(DownloadError::HttpStatus { url, status });
        }

        if self.version.is_some() {
            response
                .json::<ForgeRelease>()
                .await
                .map_err(|e| DownloadError::MalformedResponse {
                    url,
                    reason: e.to_string(),
                })
        } else {
            let info = response.json::<ForgeModuleInfo>().await.map_err(|e| {
                DownloadError::MalformedResponse {
                    url,
                    reason: e.to_string(),
                }
            })?;
            Ok(info.current_release)
        }
    }

    pub async fn download(&mut self, client: &reqwest::Client) -> Result<(), DownloadError> {
        // A pinned version with a cached blob installs without any network
        // round-trip.
        if let Some(version) = self.version.clone() {
            let blob = blob_path(&self.cache_folder, &version);
            if blob.is_file() {
                return super::install_archive(&blob, &self.target_folder(), &version).await;
            }
        }

        let release = self.resolve_release(client).await?;
        let blob = blob_path(&self.cache_folder, &release.version);

        if !blob.is_file() {
            let artifact_url = if release.file_uri.starts_with("http") {
                release.file_uri.clone()
            } else {
                format!("{}{}", self.forge_url, release.file_uri)
            };

            let response = client.get(&artifact_url).send().await.map_err(|source| {
                DownloadError::Http {
                    url: artifact_url.clone(),
                    source,
                }
            })?;
            if !response.status().is_success() {
                return Err(DownloadError::HttpStatus {
                    url: artifact_url,
                    status: response.status(),
                });
            }

            store_response(&self.cache_folder, &release.version, response).await?;
        }

        self.version = Some(release.version.clone());
        super::install_archive(&blob, &self.target_folder(), &release.version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, version: Option<&str>) -> ForgeModule {
        ForgeModule::new(
            name,
            version.map(String::from),
            None,
            DEFAULT_FORGE_URL,
        )
    }

    #[test]
    fn slug_flattens_slashes() {
        assert_eq!(module("puppetlabs/apache", None).slug(), "puppetlabs-apache");
        assert_eq!(module("puppetlabs-apache", None).slug(), "puppetlabs-apache");
    }

    #[tokio::test]
    async fn pinned_version_with_cached_blob_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let env_root = dir.path().join("env");
        tokio::fs::create_dir_all(&env_root).await.unwrap();

        let mut m = module("acme/thing", Some("1.0.0"));
        m.set_env_root(&env_root);
        let slot = dir.path().join("cache-slot");
        m.set_cache_folder(slot.clone());

        tokio::fs::create_dir_all(&slot).await.unwrap();
        std::fs::write(
            blob_path(&slot, "1.0.0"),
            crate::archive::tests_support::tiny_module_archive("acme-thing-1.0.0"),
        )
        .unwrap();

        // The client points nowhere; a request would fail the test.
        let client = reqwest::Client::builder()
            .build()
            .unwrap();
        m.download(&client).await.unwrap();

        let target = m.target_folder();
        assert!(target.join("manifests/init.pp").is_file());
        assert_eq!(
            std::fs::read_to_string(target.join(super::super::VERSION_MARKER)).unwrap(),
            "1.0.0"
        );
    }

    #[tokio::test]
    async fn corrupt_cached_blob_is_a_terminal_failure() {
        let dir = tempfile::tempdir().unwrap();
        let env_root = dir.path().join("env");
        tokio::fs::create_dir_all(&env_root).await.unwrap();

        let mut m = module("acme/broken", Some("1.0.0"));
        m.set_env_root(&env_root);
        let slot = dir.path().join("slot");
        m.set_cache_folder(slot.clone());
        tokio::fs::create_dir_all(&slot).await.unwrap();
        std::fs::write(blob_path(&slot, "1.0.0"), b"not a tarball").unwrap();

        let client = reqwest::Client::new();
        let err = m.download(&client).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
