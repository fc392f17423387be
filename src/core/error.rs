//! Error types for module fetching and module-file parsing.
//!
//! Download failures carry their retry classification with them: the place
//! that constructs the error knows whether trying again can help (a flaky
//! HTTP round-trip) or not (a version that does not exist, a corrupt
//! archive). Downstream stages trust that classification and never
//! re-inspect the cause.

use std::path::PathBuf;

use thiserror::Error;

/// A failure while materializing a module's content on disk.
///
/// Every variant is either retryable or terminal, see [`DownloadError::is_retryable`].
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The HTTP transport failed (connection refused, timeout, TLS, ...).
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The response body could not be decoded.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// The registry has no module under this name.
    #[error("module {name} not found on the forge")]
    ModuleNotFound { name: String },

    /// The requested version does not exist upstream.
    #[error("version {version} of {name} not found")]
    VersionNotFound { name: String, version: String },

    /// `git clone` or `git fetch` failed, usually a network problem.
    #[error("git {operation} of {url} failed: {stderr}")]
    Git {
        operation: &'static str,
        url: String,
        stderr: String,
    },

    /// The declared ref does not exist in the repository.
    #[error("ref {reference} not found in {url}: {stderr}")]
    RefNotFound {
        reference: String,
        url: String,
        stderr: String,
    },

    /// A local filesystem operation failed.
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cached archive could not be unpacked.
    #[error("failed extracting {}: {source}", archive.display())]
    Extract {
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Whether another attempt can reasonably succeed.
    ///
    /// Transport and transient HTTP failures are retryable. Not-found
    /// semantics, filesystem errors and extraction failures are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::HttpStatus { .. } | Self::Git { .. } => true,
            Self::MalformedResponse { .. }
            | Self::ModuleNotFound { .. }
            | Self::VersionNotFound { .. }
            | Self::RefNotFound { .. }
            | Self::Io { .. }
            | Self::Extract { .. } => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failure while parsing a module file (Puppetfile or metadata.json).
///
/// The pipeline treats these differently depending on the file: a broken
/// top-level Puppetfile aborts the run, a broken transitive metadata.json
/// is logged and skipped.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed statement in {} at line {line}: {statement}", path.display())]
    MalformedStatement {
        path: PathBuf,
        line: usize,
        statement: String,
    },

    #[error("invalid module name {name:?} in {}", path.display())]
    InvalidModuleName { path: PathBuf, name: String },

    #[error("malformed metadata in {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
