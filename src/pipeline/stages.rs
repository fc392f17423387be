//! The pipeline stages.
//!
//! Four cooperating tasks, connected by rendezvous-style channels:
//!
//! ```text
//! module files ──► parser ──► deduplicator ──► worker pool ──► aggregator
//!      ▲                                                          │
//!      └────────────────── discovered metadata ───────────────────┘
//! ```
//!
//! The parser and the deduplicator are single tasks; the worker pool runs
//! N copies of [`download_worker`] over one shared receiver. Back-pressure
//! flows upstream through the bounded channels, so a saturated worker pool
//! naturally pauses parsing and transitive discovery.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::cache::Cache;
use crate::core::DownloadError;
use crate::module::{Module, METADATA_FILENAME};

use super::work::{WorkPermit, WorkTracker};
use super::{ModuleFile, PendingFile};

/// Total download attempts per declaration, first try included.
pub(crate) const MAX_ATTEMPTS: usize = 3;

/// A declaration travelling through the pipeline, carrying its unit of
/// pending work. Dropping it anywhere finalizes the declaration.
#[derive(Debug)]
pub struct PendingModule {
    pub module: Module,
    _permit: WorkPermit,
}

impl PendingModule {
    pub(crate) fn new(module: Module, permit: WorkPermit) -> Self {
        Self {
            module,
            _permit: permit,
        }
    }
}

/// Outcome of one download attempt, as seen by the aggregator.
///
/// Terminal outcomes carry the declaration (and with it the pending-work
/// permit); a retry notice does not, because the worker still owns the
/// declaration and will report it again.
#[derive(Debug)]
pub enum DownloadResult {
    /// Content materialized at the target folder.
    Success(PendingModule),
    /// Already up to date, nothing touched.
    Skipped(PendingModule),
    /// Attempt failed but the worker will try again.
    Retrying { name: String, error: DownloadError },
    /// Failed for good.
    Failed(PendingModule, DownloadError),
}

/// Stage 2: drain module files, parse them, emit declarations.
///
/// A malformed top-level Puppetfile aborts the process; a malformed
/// transitive metadata file is logged and skipped. Either way the file's
/// own pending-work unit is released when the file value is dropped.
pub(crate) async fn process_module_files(
    mut files: mpsc::Receiver<PendingFile>,
    declarations: mpsc::Sender<PendingModule>,
    tracker: WorkTracker,
    shutdown: CancellationToken,
) {
    loop {
        let pending = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = files.recv() => match received {
                Some(pending) => pending,
                None => break,
            },
        };

        match pending.file.parse().await {
            Ok(modules) => {
                for module in modules {
                    let permit = tracker.permit();
                    if declarations
                        .send(PendingModule::new(module, permit))
                        .await
                        .is_err()
                    {
                        // Downstream closed mid-shutdown; the dropped
                        // permit keeps the accounting correct.
                        break;
                    }
                }
            }
            Err(err) if pending.file.is_manifest() => {
                tracing::error!(
                    target: "pupdeploy::pipeline",
                    "failed parsing {}: {err}",
                    pending.file.path().display()
                );
                std::process::exit(1);
            }
            Err(err) => {
                tracing::warn!(
                    target: "pupdeploy::pipeline",
                    "failed parsing {}: {err}",
                    pending.file.path().display()
                );
            }
        }
    }
}

/// Stage 3: bind paths and drop duplicate installation targets.
///
/// First declaration per target folder wins; later ones are finalized
/// immediately. Single consumer by construction, so the claimed set needs
/// no locking.
pub(crate) async fn deduplicate(
    mut declarations: mpsc::Receiver<PendingModule>,
    ready: mpsc::Sender<PendingModule>,
    cache: Cache,
    env_root: PathBuf,
) {
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    while let Some(mut pending) = declarations.recv().await {
        pending.module.set_env_root(&env_root);
        pending
            .module
            .set_cache_folder(cache.slot(&pending.module.fingerprint()));

        let target = pending.module.target_folder();
        if !claimed.insert(target.clone()) {
            tracing::debug!(
                target: "pupdeploy::pipeline",
                "dropping duplicate declaration {} for {}",
                pending.module.name(),
                target.display()
            );
            continue;
        }

        if ready.send(pending).await.is_err() {
            break;
        }
    }
}

/// Stage 4: one downloader. The pool runs several of these over a shared
/// receiver; the mutex is held only while waiting for the next
/// declaration, never across a download.
pub(crate) async fn download_worker(
    input: Arc<Mutex<mpsc::Receiver<PendingModule>>>,
    results: mpsc::Sender<DownloadResult>,
    client: reqwest::Client,
    retry_delay: Duration,
) {
    loop {
        let mut pending = {
            let mut receiver = input.lock().await;
            match receiver.recv().await {
                Some(pending) => pending,
                None => break,
            }
        };

        if pending.module.is_up_to_date().await {
            if results.send(DownloadResult::Skipped(pending)).await.is_err() {
                break;
            }
            continue;
        }

        // The declaration owns its target folder from here on; stale
        // contents from any previous run are removed wholesale.
        let target = pending.module.target_folder();
        if let Err(err) = tokio::fs::remove_dir_all(&target).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(
                    target: "pupdeploy::pipeline",
                    "cannot remove stale target folder {}: {err}",
                    target.display()
                );
                std::process::exit(1);
            }
        }

        let mut attempt = 1;
        loop {
            match pending.module.download(&client).await {
                Ok(()) => {
                    let _ = results.send(DownloadResult::Success(pending)).await;
                    break;
                }
                Err(error) if error.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let notice = DownloadResult::Retrying {
                        name: pending.module.name().to_string(),
                        error,
                    };
                    let _ = results.send(notice).await;
                    tokio::time::sleep(retry_delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    let _ = results.send(DownloadResult::Failed(pending, error)).await;
                    break;
                }
            }
        }
    }
}

/// Stage 5: log outcomes, count failures, schedule transitive discovery.
///
/// Returns the number of terminally failed declarations, which becomes the
/// process exit code.
pub(crate) async fn collect_results(
    mut results: mpsc::Receiver<DownloadResult>,
    files: mpsc::Sender<PendingFile>,
    tracker: WorkTracker,
    download_deps: bool,
) -> usize {
    let mut failures = 0;

    while let Some(result) = results.recv().await {
        match result {
            DownloadResult::Retrying { name, error } => {
                tracing::warn!(
                    target: "pupdeploy::pipeline",
                    "failed downloading {name}: {error}. Retrying"
                );
            }
            DownloadResult::Failed(pending, error) => {
                tracing::error!(
                    target: "pupdeploy::pipeline",
                    "failed downloading {}: {error}. Giving up",
                    pending.module.name()
                );
                failures += 1;
            }
            DownloadResult::Skipped(pending) => {
                tracing::debug!(
                    target: "pupdeploy::pipeline",
                    "{} is up to date",
                    pending.module.name()
                );
            }
            DownloadResult::Success(pending) => {
                tracing::info!(
                    target: "pupdeploy::pipeline",
                    "Downloaded {}",
                    pending.module.name()
                );

                if download_deps {
                    let metadata = pending.module.target_folder().join(METADATA_FILENAME);
                    if tokio::fs::try_exists(&metadata).await.unwrap_or(false) {
                        // Claim the metadata file's work unit before the
                        // module's permit drops, so the barrier cannot dip
                        // to zero in between. The send runs on its own
                        // task: a rendezvous send from here back into the
                        // parser could cycle-deadlock through the full
                        // pipeline.
                        let permit = tracker.permit();
                        let files = files.clone();
                        tokio::spawn(async move {
                            let pending_file = PendingFile {
                                file: ModuleFile::Metadata(metadata),
                                permit,
                            };
                            let _ = files.send(pending_file).await;
                        });
                    }
                }
            }
        }
    }

    failures
}
