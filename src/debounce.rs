//! # Reconciliation Scheduler
//!
//! A deletion notification may be the first half of a move whose second half
//! has not been seen yet. Instead of acting on it immediately the
//! synchronizer arms a short debounce timer; if a creation arrives first the
//! timer is cancelled, otherwise it fires a full reconciliation rescan.
//!
//! Only the most recently armed timer is tracked. Arming again replaces the
//! tracked handle without cancelling the older timer.

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Callback run when the debounce window elapses.
pub type RescanFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Statistics for the reconciliation timer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub armed: u64,
    pub cancelled: u64,
    pub fired: u64,
    pub rescan_failures: u64,
}

pub struct ReconcileScheduler {
    delay: Duration,
    rescan: RescanFn,
    pending: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<RwLock<SchedulerStats>>,
}

impl ReconcileScheduler {
    pub fn new(delay: Duration, rescan: RescanFn) -> Self {
        Self {
            delay,
            rescan,
            pending: Mutex::new(None),
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
        }
    }

    /// Start the debounce timer. Must be called from within a Tokio runtime.
    pub fn arm(&self) {
        let delay = self.delay;
        let rescan = self.rescan.clone();
        let stats = self.stats.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            stats.write().fired += 1;
            info!("No matching creation within {:?}, reconciling", delay);

            // Detached so that a late cancel() cannot interrupt copies in flight
            tokio::spawn(async move {
                if let Err(e) = (rescan)().await {
                    warn!("Reconciliation rescan failed: {}", e);
                    stats.write().rescan_failures += 1;
                }
            });
        });

        *self.pending.lock() = Some(handle);
        self.stats.write().armed += 1;
        debug!("Reconciliation armed with {:?} delay", delay);
    }

    /// Cancel the tracked timer if it has not fired yet.
    ///
    /// Returns `true` if a pending timer was cancelled.
    pub fn cancel(&self) -> bool {
        let Some(handle) = self.pending.lock().take() else {
            return false;
        };

        if handle.is_finished() {
            return false;
        }

        handle.abort();
        self.stats.write().cancelled += 1;
        debug!("Pending reconciliation cancelled");
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn get_stats(&self) -> SchedulerStats {
        self.stats.read().clone()
    }
}

impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}
