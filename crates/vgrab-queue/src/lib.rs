//! Prioritized upload queue.
//!
//! The queue holds a transient projection per video ID; the video tracker
//! stays authoritative. Admission respects priority and global pause, and
//! runs at most `max_concurrent` workers, each driving one `sync_video`.

mod error;
mod queue;
mod worker;

pub use error::{QueueError, QueueResult};
pub use queue::{AddOptions, QueueConfig, StatusQuery, UploadQueue};
