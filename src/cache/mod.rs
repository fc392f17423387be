//! Content-addressed archive cache.
//!
//! The cache is a flat directory tree: one subdirectory per module
//! fingerprint, holding version-tagged archive blobs.
//!
//! ```text
//! .cache/
//! ├── h1MLqguDhIpVEbvnD5L2DSBDXmE=/      # fingerprint of "puppetlabs/apache"
//! │   ├── 10.1.1.tar.gz
//! │   └── 11.0.0.tar.gz
//! └── tN8BJ2TF_v9rWnYoAY1IvBDlapg=/
//!     └── 4.13.1.tar.gz
//! ```
//!
//! Blobs are written create-or-overwrite and read back by exact filename.
//! A transfer in flight carries a `.part` suffix; only complete blobs ever
//! hold the blob name. Nothing is ever evicted; a second run with the same
//! pinned versions never touches the network.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::core::DownloadError;

/// Handle to the on-disk archive cache.
///
/// Cloning is cheap; all clones point at the same directory. Concurrent
/// writers are safe because every module's slot is namespaced by its
/// fingerprint and two declarations racing on the same `(fingerprint,
/// version)` blob would write identical bytes.
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    /// Open the cache at `root`, creating the directory if needed.
    ///
    /// Failure to create the root is a fatal configuration error and aborts
    /// the run before the pipeline starts.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed creating cache directory {}", root.display()))?;
        Ok(Self { root })
    }

    /// The cache slot for a module fingerprint. The directory may not exist
    /// yet; it is created on first write.
    pub fn slot(&self, fingerprint: &str) -> PathBuf {
        self.root.join(fingerprint)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Path of the archive blob for a version within a cache slot.
pub fn blob_path(slot: &Path, version: &str) -> PathBuf {
    slot.join(format!("{version}.tar.gz"))
}

/// Stream an HTTP response body into a cache blob, creating the slot
/// directory if missing and overwriting any existing blob.
///
/// The body lands in a `.part` sibling first and is renamed into place
/// only once the transfer completes, so an interrupted download never
/// leaves a truncated blob for a later attempt to trust.
pub async fn store_response(
    slot: &Path,
    version: &str,
    response: reqwest::Response,
) -> Result<PathBuf, DownloadError> {
    tokio::fs::create_dir_all(slot)
        .await
        .map_err(|e| DownloadError::io(slot, e))?;

    let blob = blob_path(slot, version);
    let partial = slot.join(format!("{version}.tar.gz.part"));

    if let Err(err) = stream_to(&partial, response).await {
        tokio::fs::remove_file(&partial).await.ok();
        return Err(err);
    }

    tokio::fs::rename(&partial, &blob)
        .await
        .map_err(|e| DownloadError::io(&blob, e))?;

    Ok(blob)
}

async fn stream_to(
    partial: &Path,
    mut response: reqwest::Response,
) -> Result<(), DownloadError> {
    let mut out = tokio::fs::File::create(partial)
        .await
        .map_err(|e| DownloadError::io(partial, e))?;

    let url = response.url().to_string();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| DownloadError::Http {
            url: url.clone(),
            source,
        })?
    {
        out.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(partial, e))?;
    }
    out.flush().await.map_err(|e| DownloadError::io(partial, e))
}
