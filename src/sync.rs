//! # Synchronizer
//!
//! [`AssetSync`] owns every piece of state the mirroring loop needs: the
//! registry of mirrored paths, the writer, the classifier and the pending
//! reconciliation timer. One instance is built per process and shared as an
//! `Arc` with the timer task.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::classify::{Action, ChangeNotification, EventClassifier, NotificationKind};
use crate::config::Layout;
use crate::debounce::{ReconcileScheduler, RescanFn, SchedulerStats};
use crate::entry::{scan_files, Entry};
use crate::error::Result;
use crate::mirror::{CopyOutcome, FileCopier, MirrorStats, MirrorWriter, TokioCopier};
use crate::paths::PathMapper;
use crate::registry::Registry;

/// Tally of one full scan of the source tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Mirrorable files found
    pub scanned: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Files the rescan left alone because the registry already lists them
    pub already_registered: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: Result<CopyOutcome>, path: &Path) {
        match outcome {
            Ok(CopyOutcome::Copied) => self.copied += 1,
            Ok(CopyOutcome::Skipped) => self.skipped += 1,
            Ok(CopyOutcome::Failed) => self.failed += 1,
            Err(e) => {
                error!("Failed to mirror {}: {}", path.display(), e);
                self.failed += 1;
            }
        }
    }
}

/// Counters for the synchronizer as a whole
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub notifications: u64,
    pub ignored: u64,
    pub rescans: u64,
}

pub struct AssetSync {
    layout: Layout,
    mapper: PathMapper,
    registry: Arc<Registry>,
    writer: MirrorWriter,
    classifier: EventClassifier,
    scheduler: ReconcileScheduler,
    stats: RwLock<SyncStats>,
}

impl AssetSync {
    pub fn new(layout: Layout) -> Arc<Self> {
        Self::with_copier(layout, Arc::new(TokioCopier))
    }

    pub fn with_copier(layout: Layout, copier: Arc<dyn FileCopier>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let mapper = PathMapper::new(&layout);
            let registry = Arc::new(Registry::new());
            let writer = MirrorWriter::with_copier(mapper.clone(), registry.clone(), copier);
            let classifier = EventClassifier::new(mapper.clone());
            let scheduler = ReconcileScheduler::new(layout.debounce, rescan_callback(weak.clone()));

            Self {
                layout,
                mapper,
                registry,
                writer,
                classifier,
                scheduler,
                stats: RwLock::new(SyncStats::default()),
            }
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    pub fn mirror_stats(&self) -> MirrorStats {
        self.writer.stats()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.get_stats()
    }

    pub fn reconcile_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Mirror every non-source file once.
    pub async fn initial_scan(&self) -> Result<ScanReport> {
        info!("Performing initial sync of {}", self.layout.src.display());

        let mut report = ScanReport::default();
        for entry in self.mirrorable_files().await? {
            report.scanned += 1;
            let outcome = self.writer.copy_to_dist(&entry).await;
            report.record(outcome, &entry.path());
        }

        info!(
            "Initial sync completed: {} files, {} copied, {} unchanged, {} failed",
            report.scanned, report.copied, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Rescan the source tree and mirror whatever the registry does not list.
    pub async fn reconcile(&self) -> Result<ScanReport> {
        self.stats.write().rescans += 1;

        let mut report = ScanReport::default();
        for entry in self.mirrorable_files().await? {
            report.scanned += 1;
            let path = entry.path();
            if self.registry.contains(&path) {
                report.already_registered += 1;
                continue;
            }
            let outcome = self.writer.copy_to_dist(&entry).await;
            report.record(outcome, &path);
        }

        info!(
            "Reconciliation finished: {} copied, {} already mirrored",
            report.copied, report.already_registered
        );
        Ok(report)
    }

    /// Classify one notification and carry out what it calls for.
    pub async fn handle_notification(&self, notification: &ChangeNotification) -> Result<Action> {
        self.stats.write().notifications += 1;
        debug!(
            "{} {}",
            match notification.kind {
                NotificationKind::Rename => "rename",
                NotificationKind::Change => "change",
            },
            notification
                .filename
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );

        let action = self.classifier.classify(notification).await?;

        if action.is_creation() {
            self.scheduler.cancel();
        }

        match &action {
            Action::Ignore(reason) => {
                debug!("Ignored: {:?}", reason);
                self.stats.write().ignored += 1;
            }
            Action::RemoveDir { src, dist } => {
                self.writer.remove_dir_from_dist(dist).await?;
                self.registry.remove_under(src);
            }
            Action::Delete { src, dist } => {
                self.registry.remove(src);
                self.writer.remove_from_dist(dist).await?;
                self.scheduler.arm();
            }
            Action::Create(entry) | Action::Change(entry) => {
                self.writer.copy_to_dist(entry).await?;
            }
            Action::CreateDir => {}
        }

        Ok(action)
    }

    /// Initial scan followed by the watch loop.
    ///
    /// Notifications that arrive during the scan wait in the channel. The loop
    /// ends when the sending side is dropped.
    pub async fn run(&self, mut notifications: mpsc::Receiver<ChangeNotification>) -> Result<()> {
        self.initial_scan().await?;

        info!("Watching {} for changes...", self.layout.src.display());

        while let Some(notification) = notifications.recv().await {
            if let Err(e) = self.handle_notification(&notification).await {
                error!("Failed to handle file event: {}", e);
            }
        }

        info!("Notification channel closed");
        Ok(())
    }

    async fn mirrorable_files(&self) -> Result<Vec<Entry>> {
        let entries = scan_files(&self.layout.src).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| !self.mapper.is_excluded(&entry.path()))
            .collect())
    }
}

fn rescan_callback(sync: Weak<AssetSync>) -> RescanFn {
    Arc::new(move || -> BoxFuture<'static, Result<()>> {
        let sync = sync.clone();
        Box::pin(async move {
            match sync.upgrade() {
                Some(sync) => sync.reconcile().await.map(|_| ()),
                None => Ok(()),
            }
        })
    })
}
