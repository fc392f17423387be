//! Module declarations and their download behavior.
//!
//! A [`Module`] is one parsed entry from a Puppetfile or a `metadata.json`:
//! the module's name, an optional pinned version, and where to get it from.
//! Three sources exist:
//!
//! - [`ForgeModule`], a release archive from the Puppet Forge API,
//! - [`GitModule`], a clone of a git repository at an optional ref,
//! - [`GithubTarballModule`], a release tarball from the GitHub tags API.
//!
//! The variants share one capability set (target folder, fingerprint,
//! up-to-date check, download) dispatched through the enum. The
//! deduplicator binds the environment root and cache slot before a
//! declaration reaches a downloader; the paths are meaningless before that.

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::core::DownloadError;

mod forge;
mod git;
mod tarball;

pub use forge::{ForgeModule, DEFAULT_FORGE_URL};
pub use git::GitModule;
pub use tarball::GithubTarballModule;

/// Name of the marker file recording the installed version.
pub const VERSION_MARKER: &str = ".version";

/// Metadata document looked up inside an installed module for transitive
/// dependency discovery.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Default install subpath under the environment root.
pub const DEFAULT_INSTALL_DIR: &str = "modules";

/// One parsed module declaration.
#[derive(Debug)]
pub enum Module {
    Forge(ForgeModule),
    Git(GitModule),
    GithubTarball(GithubTarballModule),
}

impl Module {
    /// The declared module name, as written in the source file.
    pub fn name(&self) -> &str {
        match self {
            Self::Forge(m) => m.name(),
            Self::Git(m) => m.name(),
            Self::GithubTarball(m) => m.name(),
        }
    }

    /// The declared (or, after a download, resolved) version. `None` means
    /// "whatever is current upstream".
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Forge(m) => m.version(),
            Self::Git(m) => m.version(),
            Self::GithubTarball(m) => m.version(),
        }
    }

    /// Bind the environment root that frames the target folder. Called by
    /// the deduplicator, exactly once per declaration.
    pub fn set_env_root(&mut self, root: &Path) {
        match self {
            Self::Forge(m) => m.set_env_root(root),
            Self::Git(m) => m.set_env_root(root),
            Self::GithubTarball(m) => m.set_env_root(root),
        }
    }

    /// Bind the cache slot derived from this module's fingerprint.
    pub fn set_cache_folder(&mut self, slot: PathBuf) {
        match self {
            Self::Forge(m) => m.set_cache_folder(slot),
            Self::Git(m) => m.set_cache_folder(slot),
            Self::GithubTarball(m) => m.set_cache_folder(slot),
        }
    }

    /// Stable, filesystem-safe digest of the module name. Names the cache
    /// slot; two declarations for the same name share a slot regardless of
    /// where they are fetched from (blobs are version-tagged, so the shared
    /// slot is harmless).
    pub fn fingerprint(&self) -> String {
        fingerprint(self.name())
    }

    /// Where the module's contents are materialized. Two declarations are
    /// the same installation iff their target folders match.
    pub fn target_folder(&self) -> PathBuf {
        match self {
            Self::Forge(m) => m.target_folder(),
            Self::Git(m) => m.target_folder(),
            Self::GithubTarball(m) => m.target_folder(),
        }
    }

    /// Whether the installed copy already satisfies the declaration: the
    /// target folder exists and either no version is pinned or the
    /// `.version` marker matches.
    pub async fn is_up_to_date(&self) -> bool {
        folder_up_to_date(&self.target_folder(), self.version()).await
    }

    /// Materialize the module's content at its target folder.
    pub async fn download(&mut self, client: &reqwest::Client) -> Result<(), DownloadError> {
        match self {
            Self::Forge(m) => m.download(client).await,
            Self::Git(m) => m.download().await,
            Self::GithubTarball(m) => m.download(client).await,
        }
    }
}

/// SHA-1 of the module name, URL-safe base64. Collision resistance here
/// only has to beat accidental overlap between module names.
pub fn fingerprint(name: &str) -> String {
    use base64::engine::general_purpose::URL_SAFE;
    use base64::Engine;

    let digest = Sha1::digest(name.as_bytes());
    URL_SAFE.encode(digest)
}

/// Last `/`- or `-`-separated segment of a module name.
///
/// Both `puppetlabs/apache` and `puppetlabs-apache` install as `apache`.
pub fn leaf_name(name: &str) -> &str {
    name.rsplit(['/', '-'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(name)
}

pub(crate) fn resolve_target(
    env_root: &Path,
    install_path: Option<&str>,
    name: &str,
) -> PathBuf {
    debug_assert!(
        !env_root.as_os_str().is_empty(),
        "target folder requested before the environment root was bound"
    );
    let subdir = install_path.unwrap_or(DEFAULT_INSTALL_DIR);
    env_root.join(subdir).join(leaf_name(name))
}

pub(crate) async fn folder_up_to_date(target: &Path, version: Option<&str>) -> bool {
    match tokio::fs::metadata(target).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return false,
    }

    let Some(declared) = version else {
        // Present and unpinned: good enough.
        return true;
    };

    match tokio::fs::read_to_string(target.join(VERSION_MARKER)).await {
        Ok(installed) => installed.trim() == declared,
        Err(err) => {
            tracing::debug!(
                target: "pupdeploy::module",
                "no readable version marker in {}: {err}",
                target.display()
            );
            false
        }
    }
}

pub(crate) async fn write_version_marker(
    target: &Path,
    version: &str,
) -> Result<(), DownloadError> {
    let marker = target.join(VERSION_MARKER);
    tokio::fs::write(&marker, version)
        .await
        .map_err(|e| DownloadError::io(&marker, e))
}

/// Extract a cached blob into the target folder and stamp the version
/// marker. Shared by the two archive-backed variants.
pub(crate) async fn install_archive(
    blob: &Path,
    target: &Path,
    version: &str,
) -> Result<(), DownloadError> {
    let blob_owned = blob.to_path_buf();
    let target_owned = target.to_path_buf();
    let unpack = tokio::task::spawn_blocking(move || {
        crate::archive::extract_tar_gz(&blob_owned, &target_owned)
    })
    .await
    .map_err(|join_err| DownloadError::Extract {
        archive: blob.to_path_buf(),
        source: std::io::Error::other(join_err),
    })?;

    unpack.map_err(|source| DownloadError::Extract {
        archive: blob.to_path_buf(),
        source,
    })?;

    write_version_marker(target, version).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_name_splits_on_slash_and_dash() {
        assert_eq!(leaf_name("puppetlabs/stdlib"), "stdlib");
        assert_eq!(leaf_name("puppetlabs-apache"), "apache");
        assert_eq!(leaf_name("acme/infra-profile"), "profile");
        assert_eq!(leaf_name("plain"), "plain");
    }

    #[test]
    fn fingerprint_is_stable_and_filesystem_safe() {
        let a = fingerprint("puppetlabs/apache");
        let b = fingerprint("puppetlabs/apache");
        assert_eq!(a, b);
        assert!(!a.contains('/'));
        assert_ne!(a, fingerprint("puppetlabs/stdlib"));
    }

    #[test]
    fn target_honors_install_path_override() {
        let root = Path::new("/env");
        assert_eq!(
            resolve_target(root, None, "acme/thing"),
            PathBuf::from("/env/modules/thing")
        );
        assert_eq!(
            resolve_target(root, Some("site"), "acme/thing"),
            PathBuf::from("/env/site/thing")
        );
    }

    #[tokio::test]
    async fn up_to_date_requires_matching_marker() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("thing");
        tokio::fs::create_dir_all(&target).await.unwrap();

        // Unpinned: presence is enough.
        assert!(folder_up_to_date(&target, None).await);
        // Pinned but no marker.
        assert!(!folder_up_to_date(&target, Some("1.0.0")).await);

        tokio::fs::write(target.join(VERSION_MARKER), "1.0.0")
            .await
            .unwrap();
        assert!(folder_up_to_date(&target, Some("1.0.0")).await);
        assert!(!folder_up_to_date(&target, Some("2.0.0")).await);
    }

    #[tokio::test]
    async fn missing_folder_is_never_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!folder_up_to_date(&dir.path().join("absent"), None).await);
    }
}
