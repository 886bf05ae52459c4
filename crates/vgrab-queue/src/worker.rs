//! Per-item worker: drives `sync_video` with cancellation.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

use vgrab_models::{QueueItemState, VideoId};
use vgrab_tracker::{SyncOptions, SyncProgress, TrackerError};

use crate::queue::UploadQueue;

/// Upload share of the progress bar; download fills the first half.
const UPLOAD_PROGRESS_BASE: f64 = 50.0;

/// Run one admitted item to completion, cancellation, or failure.
///
/// Cancellation drops the sync future at its next suspension point; the
/// downloader's temp-file guard cleans up on drop, and the record is
/// recovered later by `reset_stuck_uploads` if it was mid-upload.
pub(crate) async fn run_item(queue: Arc<UploadQueue>, video_id: VideoId, cancel: Arc<Notify>) {
    info!(video_id = %video_id, "worker started");

    let progress_queue = Arc::clone(&queue);
    let progress_id = video_id.clone();
    let sync = queue.tracker.sync_video_with_progress(
        &video_id,
        SyncOptions::default(),
        move |progress| match progress {
            SyncProgress::Download { bytes, elapsed_secs } => {
                let speed = if elapsed_secs > 0.0 {
                    bytes as f64 / elapsed_secs
                } else {
                    0.0
                };
                // Download size is unknown up front; saturate its half of
                // the bar at 100 MiB so the number keeps moving.
                let fraction = (bytes as f64 / (100.0 * 1024.0 * 1024.0)).min(1.0);
                progress_queue.update_progress(
                    &progress_id,
                    fraction * UPLOAD_PROGRESS_BASE,
                    speed,
                    0.0,
                );
            }
            SyncProgress::Upload { bytes, total } => {
                let fraction = if total > 0 {
                    bytes as f64 / total as f64
                } else {
                    0.0
                };
                progress_queue.update_progress(
                    &progress_id,
                    UPLOAD_PROGRESS_BASE + fraction * (100.0 - UPLOAD_PROGRESS_BASE),
                    0.0,
                    0.0,
                );
            }
        },
    );

    tokio::select! {
        biased;
        _ = cancel.notified() => {
            warn!(video_id = %video_id, "worker cancelled");
            queue.finish_item(&video_id, QueueItemState::Cancelled, None);
        }
        result = sync => match result {
            Ok((_, outcome)) => {
                info!(video_id = %video_id, ?outcome, "worker finished");
                queue.finish_item(&video_id, QueueItemState::Completed, None);
            }
            Err(TrackerError::SyncInProgress(_)) => {
                // Another path is already syncing this record; treat the
                // queue item as done rather than failed.
                queue.finish_item(&video_id, QueueItemState::Completed, None);
            }
            Err(e) => {
                warn!(video_id = %video_id, "worker failed: {}", e);
                queue.finish_item(&video_id, QueueItemState::Failed, Some(e.to_string()));
            }
        },
    }
}
