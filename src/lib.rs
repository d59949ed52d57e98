//! # asset-sync
//!
//! A development-time watcher that mirrors non-source files (images, JSON,
//! manifests, ...) from a project's source tree into its build output tree,
//! preserving the relative directory structure.
//!
//! ## How it works
//!
//! 1. A full recursive scan copies every non-source file once.
//! 2. A recursive file system subscription then feeds notifications to the
//!    synchronizer, which re-probes the tree to tell creations, deletions and
//!    modifications apart.
//! 3. Deletions arm a short debounce timer. If the matching creation of a
//!    move arrives first the timer is cancelled; otherwise a rescan backfills
//!    anything that was missed.
//!
//! Overwrites are staged through a backup tree so a failed copy leaves the
//! previous output in place.
//!
//! ## Core Modules
//!
//! - [`sync`] - The synchronizer owning all mirroring state
//! - [`classify`] - Notification classification by existence probing
//! - [`mirror`] - Crash-safe copy and pruning removal
//! - [`debounce`] - The reconciliation timer
//! - [`watcher`] - `notify` subscription on the source tree
//! - [`config`] - `asset-sync.toml` and layout resolution
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a default asset-sync.toml
//! asset-sync init
//!
//! # Mirror once
//! asset-sync sync
//!
//! # Mirror and keep watching
//! asset-sync watch --debounce-ms 150
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod entry;
pub mod error;
pub mod mirror;
pub mod paths;
pub mod registry;
pub mod sync;
pub mod watcher;

pub use config::{Layout, SyncConfig};
pub use error::{Result, SyncError};
pub use sync::AssetSync;
