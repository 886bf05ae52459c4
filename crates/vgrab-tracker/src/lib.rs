//! Persistent trackers and storage reconciliation.
//!
//! The URL tracker records the lifecycle of scrape requests; the video
//! tracker owns the authoritative state of every discovered media asset
//! and drives the download→validate→upload pipeline; the reconciler
//! diffs the tracker against the object store's inventory.

mod error;
mod reconcile;
mod urls;
mod videos;

pub use error::{TrackerError, TrackerResult};
pub use reconcile::{InventoryEntry, OutOfSyncEntry, ReconcileReport, StorageReconciler};
pub use urls::{extract_title, UrlTracker};
pub use videos::{
    RetryOptions, SyncOptions, SyncOutcome, SyncProgress, VideoQuery, VideoStats, VideoTracker,
    VideoUpdate,
};
