//! The concurrent fetch pipeline.
//!
//! [`run`] wires the five stages together: a channel of module files seeded
//! with the Puppetfile, a parser task emitting declarations, a deduplicator
//! binding paths and dropping duplicate targets, a pool of download
//! workers, and a result aggregator that feeds discovered `metadata.json`
//! files back into the front of the pipeline.
//!
//! Termination is driven by the pending-work barrier in [`work`]: when the
//! last permit is released the driver cancels the parser, and channel
//! closure cascades downstream (declarations, then deduplicated
//! declarations, then results) until every stage has exited. The
//! aggregator's failure count becomes the process exit code.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::cache::Cache;
use crate::core::ParseError;
use crate::module::Module;

pub mod stages;
pub mod work;

pub use stages::{DownloadResult, PendingModule};
pub use work::{WorkPermit, WorkTracker};

/// Default size of the download worker pool.
pub const DEFAULT_WORKERS: usize = 4;

/// Default cache directory, relative to the invocation directory.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Pause between download attempts of the same declaration.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on a single HTTP round-trip. A stalled transfer surfaces
/// as a retryable timeout instead of parking a worker forever.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// A source of module declarations: the top-level Puppetfile or an
/// installed module's `metadata.json`.
#[derive(Debug)]
pub enum ModuleFile {
    Puppetfile(PathBuf),
    Metadata(PathBuf),
}

impl ModuleFile {
    pub fn path(&self) -> &Path {
        match self {
            Self::Puppetfile(path) | Self::Metadata(path) => path,
        }
    }

    /// Whether this is the top-level manifest, whose parse failures are
    /// fatal rather than skippable.
    pub fn is_manifest(&self) -> bool {
        matches!(self, Self::Puppetfile(_))
    }

    /// Read and parse the file into declarations, in source order.
    pub async fn parse(&self) -> Result<Vec<Module>, ParseError> {
        let contents = tokio::fs::read_to_string(self.path())
            .await
            .map_err(|source| ParseError::Io {
                path: self.path().to_path_buf(),
                source,
            })?;

        match self {
            Self::Puppetfile(path) => crate::puppetfile::parse(path, &contents),
            Self::Metadata(path) => crate::metadata::parse(path, &contents),
        }
    }
}

/// A module file queued for parsing, holding its unit of pending work.
#[derive(Debug)]
pub struct PendingFile {
    pub file: ModuleFile,
    pub permit: WorkPermit,
}

/// Everything [`run`] needs to deploy one environment.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory that frames all module target folders.
    pub env_root: PathBuf,
    /// The manifest to seed the pipeline with.
    pub puppetfile: PathBuf,
    /// Root of the archive cache.
    pub cache_dir: PathBuf,
    /// Size of the download worker pool.
    pub workers: usize,
    /// Whether to discover and install transitive dependencies.
    pub download_deps: bool,
    /// Pause between download attempts.
    pub retry_delay: Duration,
}

impl PipelineOptions {
    pub fn new(env_root: impl Into<PathBuf>) -> Self {
        let env_root = env_root.into();
        Self {
            puppetfile: env_root.join("Puppetfile"),
            env_root,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            workers: DEFAULT_WORKERS,
            download_deps: true,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Run the pipeline to completion and return the number of modules that
/// failed terminally.
pub async fn run(options: PipelineOptions) -> Result<usize> {
    if !tokio::fs::try_exists(&options.puppetfile).await.unwrap_or(false) {
        anyhow::bail!("no Puppetfile at {}", options.puppetfile.display());
    }

    let cache = Cache::open(&options.cache_dir).await?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("pupdeploy/", env!("CARGO_PKG_VERSION")))
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .context("failed building the HTTP client")?;

    // Capacity 1 is tokio's closest thing to a rendezvous channel; the
    // back-pressure chain from workers up to transitive discovery is what
    // bounds memory.
    let (file_tx, file_rx) = mpsc::channel::<PendingFile>(1);
    let (decl_tx, decl_rx) = mpsc::channel::<PendingModule>(1);
    let (ready_tx, ready_rx) = mpsc::channel::<PendingModule>(1);
    let (result_tx, result_rx) = mpsc::channel::<DownloadResult>(1);

    let tracker = WorkTracker::new();
    let shutdown = CancellationToken::new();

    let parser = tokio::spawn(stages::process_module_files(
        file_rx,
        decl_tx,
        tracker.clone(),
        shutdown.clone(),
    ));
    let dedup = tokio::spawn(stages::deduplicate(
        decl_rx,
        ready_tx,
        cache.clone(),
        options.env_root.clone(),
    ));

    let shared_input = Arc::new(Mutex::new(ready_rx));
    let workers: Vec<_> = (0..options.workers.max(1))
        .map(|_| {
            tokio::spawn(stages::download_worker(
                Arc::clone(&shared_input),
                result_tx.clone(),
                client.clone(),
                options.retry_delay,
            ))
        })
        .collect();
    drop(result_tx);

    let aggregator = tokio::spawn(stages::collect_results(
        result_rx,
        file_tx.clone(),
        tracker.clone(),
        options.download_deps,
    ));

    // Seed the manifest. Its permit is claimed before the send so the
    // barrier is up before anyone can possibly wait on it.
    let permit = tracker.permit();
    file_tx
        .send(PendingFile {
            file: ModuleFile::Puppetfile(options.puppetfile.clone()),
            permit,
        })
        .await
        .ok()
        .context("module file channel closed before the manifest was seeded")?;

    tracker.wait_idle().await;

    // All work is accounted for; stop the parser and let channel closure
    // ripple down through the stages.
    shutdown.cancel();
    drop(file_tx);

    parser.await.context("parser stage panicked")?;
    dedup.await.context("deduplicator stage panicked")?;
    for joined in futures::future::join_all(workers).await {
        joined.context("download worker panicked")?;
    }
    let failures = aggregator.await.context("result aggregator panicked")?;

    Ok(failures)
}
