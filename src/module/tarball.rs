//! GitHub release-tarball modules.
//!
//! For repositories that never publish to the Forge, the tags API provides
//! version discovery and a tarball URL per tag. The declared version must
//! match a tag name exactly; an unpinned declaration takes the newest tag
//! (index zero in the API's ordering) and adopts its name as the resolved
//! version.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::{blob_path, store_response};
use crate::core::DownloadError;

/// Default GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug)]
pub struct GithubTarballModule {
    name: String,
    repo: String,
    version: Option<String>,
    api_url: String,
    install_path: Option<String>,
    env_root: PathBuf,
    cache_folder: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RepoTag {
    name: String,
    tarball_url: String,
}

impl GithubTarballModule {
    pub fn new(
        name: impl Into<String>,
        repo: impl Into<String>,
        version: Option<String>,
        install_path: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            repo: repo.into(),
            version,
            api_url: DEFAULT_API_URL.to_string(),
            install_path,
            env_root: PathBuf::new(),
            cache_folder: PathBuf::new(),
        }
    }

    /// Point the module at a different API host. Exists for tests and for
    /// GitHub Enterprise installations.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
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

    /// Pick the tag for the declared version, or the newest tag when
    /// unpinned. A missing version is terminal; transport and HTTP-level
    /// failures are worth retrying.
    async fn resolve_tag(&self, client: &reqwest::Client) -> Result<RepoTag, DownloadError> {
        let url = format!("{}/repos/{}/tags", self.api_url, self.repo);

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|source| DownloadError::Http {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                url,
                status: response.status(),
            });
        }

        let tags: Vec<RepoTag> =
            response
                .json()
                .await
                .map_err(|e| DownloadError::MalformedResponse {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;

        match &self.version {
            Some(version) => tags
                .into_iter()
                .find(|tag| &tag.name == version)
                .ok_or_else(|| DownloadError::VersionNotFound {
                    name: self.name.clone(),
                    version: version.clone(),
                }),
            None => tags
                .into_iter()
                .next()
                .ok_or(DownloadError::MalformedResponse {
                    url,
                    reason: "repository has no tags".to_string(),
                }),
        }
    }

    pub async fn download(&mut self, client: &reqwest::Client) -> Result<(), DownloadError> {
        if let Some(version) = self.version.clone() {
            let blob = blob_path(&self.cache_folder, &version);
            if blob.is_file() {
                return super::install_archive(&blob, &self.target_folder(), &version).await;
            }
        }

        let tag = self.resolve_tag(client).await?;
        let blob = blob_path(&self.cache_folder, &tag.name);

        if !blob.is_file() {
            let response = client.get(&tag.tarball_url).send().await.map_err(|source| {
                DownloadError::Http {
                    url: tag.tarball_url.clone(),
                    source,
                }
            })?;
            if !response.status().is_success() {
                return Err(DownloadError::HttpStatus {
                    url: tag.tarball_url.clone(),
                    status: response.status(),
                });
            }

            store_response(&self.cache_folder, &tag.name, response).await?;
        }

        self.version = Some(tag.name.clone());
        super::install_archive(&blob, &self.target_folder(), &tag.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pinned_version_with_cached_blob_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let env_root = dir.path().join("env");
        tokio::fs::create_dir_all(&env_root).await.unwrap();

        let mut m = GithubTarballModule::new(
            "acme/widgets",
            "acme/puppet-widgets",
            Some("v3.0.0".into()),
            None,
        );
        m.set_env_root(&env_root);
        let slot = dir.path().join("slot");
        m.set_cache_folder(slot.clone());
        tokio::fs::create_dir_all(&slot).await.unwrap();
        std::fs::write(
            blob_path(&slot, "v3.0.0"),
            crate::archive::tests_support::tiny_module_archive("acme-puppet-widgets-abc123"),
        )
        .unwrap();

        let client = reqwest::Client::new();
        m.download(&client).await.unwrap();

        let target = m.target_folder();
        assert!(target.join("manifests/init.pp").is_file());
        assert_eq!(
            std::fs::read_to_string(target.join(super::super::VERSION_MARKER)).unwrap(),
            "v3.0.0"
        );
    }

    #[tokio::test]
    async fn unreachable_api_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = GithubTarballModule::new("acme/widgets", "acme/puppet-widgets", None, None)
            .with_api_url("http://127.0.0.1:1/unreachable");
        m.set_env_root(dir.path());
        m.set_cache_folder(dir.path().join("slot"));

        let client = reqwest::Client::new();
        let err = m.download(&client).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
