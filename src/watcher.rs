//! # Source Tree Watcher
//!
//! Bridges `notify` into the synchronizer. Native events are collapsed into
//! the two notification kinds the classifier understands:
//!
//! - creations, removals and renames become [`NotificationKind::Rename`]
//! - content and metadata modifications become [`NotificationKind::Change`]
//!
//! Paths are reported relative to the watched root. Events outside the root
//! and access events are dropped.

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::classify::{ChangeNotification, NotificationKind};
use crate::error::Result;

/// Performance statistics for the watcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub events_received: u64,
    pub notifications_sent: u64,
    pub events_dropped: u64,
    pub watch_errors: u64,
}

/// Keeps a recursive subscription on the source root alive.
///
/// Dropping the watcher ends the subscription and closes the notification
/// channel.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
    stats: Arc<RwLock<WatcherStats>>,
}

impl SourceWatcher {
    /// Start watching `root` and return the receiving end of the
    /// notification stream.
    ///
    /// Events start buffering immediately, so an initial scan run after this
    /// call cannot miss changes.
    pub fn start(root: &Path, capacity: usize) -> Result<(Self, mpsc::Receiver<ChangeNotification>)> {
        let (tx, rx) = mpsc::channel(capacity);
        let stats = Arc::new(RwLock::new(WatcherStats::default()));

        // Some backends report canonical paths (e.g. /private/var on macOS)
        let roots: Vec<PathBuf> = {
            let mut roots = vec![root.to_path_buf()];
            if let Ok(canonical) = root.canonicalize() {
                if canonical != root {
                    roots.push(canonical);
                }
            }
            roots
        };

        let stats_clone = stats.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("File system watch error: {}", e);
                    stats_clone.write().watch_errors += 1;
                    return;
                }
            };

            let notifications = to_notifications(&event, &roots);
            {
                let mut stats = stats_clone.write();
                stats.events_received += 1;
                if notifications.is_empty() {
                    stats.events_dropped += 1;
                }
            }

            for notification in notifications {
                if let Err(e) = tx.blocking_send(notification) {
                    error!("Failed to send file event: {}", e);
                    return;
                }
                stats_clone.write().notifications_sent += 1;
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        info!("Watching source directory: {}", root.display());

        Ok((
            Self {
                _watcher: watcher,
                root: root.to_path_buf(),
                stats,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get_stats(&self) -> WatcherStats {
        self.stats.read().clone()
    }
}

/// Convert notify EventKind to the notification kind, if it is one we act on
pub fn event_kind_to_notification_kind(kind: &EventKind) -> Option<NotificationKind> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => Some(NotificationKind::Rename),
        EventKind::Modify(ModifyKind::Name(_)) => Some(NotificationKind::Rename),
        EventKind::Modify(_) => Some(NotificationKind::Change),
        _ => None,
    }
}

/// One notification per event path that lies under one of `roots`.
pub fn to_notifications(event: &Event, roots: &[PathBuf]) -> Vec<ChangeNotification> {
    let Some(kind) = event_kind_to_notification_kind(&event.kind) else {
        return Vec::new();
    };

    event
        .paths
        .iter()
        .filter_map(|path| {
            roots
                .iter()
                .find_map(|root| path.strip_prefix(root).ok())
                .filter(|relative| !relative.as_os_str().is_empty())
        })
        .map(|relative| ChangeNotification {
            kind,
            filename: Some(relative.to_path_buf()),
        })
        .collect()
}
