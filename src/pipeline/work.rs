//! The pending-work barrier.
//!
//! Every module-file waiting to be parsed and every declaration still in
//! flight holds one [`WorkPermit`]. The driver waits on the tracker until
//! the last permit is gone, which is the only termination signal the
//! pipeline has: channels stay open for transitive discovery until then.
//!
//! A permit releases its unit of work when dropped, so ownership does the
//! exactly-once bookkeeping: a declaration dropped by the deduplicator, a
//! module finalized by the aggregator and a metadata file discarded after
//! parsing all release in the same way, and double-release is impossible
//! by construction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicUsize,
    idle: Notify,
}

/// Shared counter of work units still in flight.
#[derive(Debug, Clone, Default)]
pub struct WorkTracker {
    inner: Arc<Inner>,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim one unit of pending work. The unit is released when the
    /// returned permit is dropped.
    pub fn permit(&self) -> WorkPermit {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        WorkPermit {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of units currently in flight.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Wait until no work is in flight.
    ///
    /// Callers seed their first permit before waiting; an empty tracker is
    /// already idle.
    pub async fn wait_idle(&self) {
        loop {
            // Register interest before re-checking, otherwise a release
            // between the check and the await would be missed.
            let notified = self.inner.idle.notified();
            if self.inner.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One unit of pending work. Released on drop, exactly once.
#[derive(Debug)]
pub struct WorkPermit {
    inner: Arc<Inner>,
}

impl Drop for WorkPermit {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn empty_tracker_is_idle() {
        WorkTracker::new().wait_idle().await;
    }

    #[tokio::test]
    async fn waits_for_all_permits() {
        let tracker = WorkTracker::new();
        let first = tracker.permit();
        let second = tracker.permit();
        assert_eq!(tracker.pending(), 2);

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn permits_claimed_while_waiting_keep_the_barrier_up() {
        let tracker = WorkTracker::new();
        let first = tracker.permit();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };

        // Claim a follow-up unit before releasing the first, the way the
        // aggregator does for discovered metadata files.
        let second = tracker.permit();
        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
