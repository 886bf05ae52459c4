//! Queue membership and admission.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Notify;
use tracing::{debug, info};

use vgrab_events::{Event, EventBus, EventKind};
use vgrab_models::{QueueItem, QueueItemState, QueueStatusPage, VideoId};
use vgrab_tracker::VideoTracker;

use crate::error::{QueueError, QueueResult};
use crate::worker;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Active workers at once
    pub max_concurrent: usize,
    /// Terminal items kept for the status endpoint
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            history_limit: 50,
        }
    }
}

/// Options accepted by `add`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddOptions {
    #[serde(default)]
    pub priority: i32,
    pub display_name: Option<String>,
    pub display_url: Option<String>,
}

/// Pagination for `get_status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub history_offset: usize,
    #[serde(default)]
    pub history_limit: usize,
}

pub(crate) struct ActiveEntry {
    pub item: QueueItem,
    pub cancel: Arc<Notify>,
}

pub(crate) struct QueueInner {
    pub pending: Vec<QueueItem>,
    pub active: HashMap<String, ActiveEntry>,
    pub history: VecDeque<QueueItem>,
    pub is_paused: bool,
}

impl QueueInner {
    fn contains_live(&self, video_id: &str) -> bool {
        self.active.contains_key(video_id)
            || self.pending.iter().any(|i| i.video_id.as_str() == video_id)
    }
}

/// Prioritized upload queue with bounded concurrency.
///
/// Membership (pending list + active map + history) is guarded by one
/// mutex; admission decisions happen under it and workers are spawned
/// outside it. Each video ID is in at most one of the live collections.
pub struct UploadQueue {
    pub(crate) inner: Mutex<QueueInner>,
    pub(crate) config: QueueConfig,
    pub(crate) tracker: Arc<VideoTracker>,
    pub(crate) bus: Arc<EventBus>,
}

impl UploadQueue {
    pub fn new(config: QueueConfig, tracker: Arc<VideoTracker>, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner {
                pending: Vec::new(),
                active: HashMap::new(),
                history: VecDeque::new(),
                is_paused: false,
            }),
            config,
            tracker,
            bus,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().expect("queue lock poisoned")
    }

    /// Enqueue a video. A duplicate add returns the existing queue
    /// position and promotes the priority if the new one is higher.
    pub fn add(self: &Arc<Self>, video_id: VideoId, options: AddOptions) -> usize {
        let position = {
            let mut inner = self.lock();

            if let Some(existing) = inner
                .pending
                .iter_mut()
                .find(|i| i.video_id == video_id)
            {
                if options.priority > existing.priority {
                    existing.priority = options.priority;
                }
            } else if !inner.contains_live(video_id.as_str()) {
                let mut item = QueueItem::new(video_id.clone(), options.priority);
                item.display_name = options.display_name;
                item.display_url = options.display_url;
                inner.pending.push(item);
                debug!(video_id = %video_id, "enqueued");
            }

            Self::position_of(&inner, video_id.as_str())
        };

        self.bus.publish(
            Event::new(EventKind::UploadQueued, "queued for upload")
                .with_video(video_id.to_string()),
        );
        self.publish_state();
        self.process_next();
        position
    }

    /// Enqueue several videos; returns their positions.
    pub fn add_many(self: &Arc<Self>, ids: Vec<(VideoId, AddOptions)>) -> Vec<usize> {
        ids.into_iter()
            .map(|(id, options)| self.add(id, options))
            .collect()
    }

    /// Admission-order position of a live item (active first).
    fn position_of(inner: &QueueInner, video_id: &str) -> usize {
        if inner.active.contains_key(video_id) {
            return 0;
        }
        let mut sorted: Vec<&QueueItem> = inner
            .pending
            .iter()
            .filter(|i| i.state == QueueItemState::Pending)
            .collect();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.added_at.cmp(&b.added_at)));
        sorted
            .iter()
            .position(|i| i.video_id.as_str() == video_id)
            .map(|p| p + inner.active.len())
            .unwrap_or(0)
    }

    /// Pause one pending item.
    pub fn pause(&self, video_id: &VideoId) -> QueueResult<()> {
        let mut inner = self.lock();
        let item = inner
            .pending
            .iter_mut()
            .find(|i| i.video_id == *video_id)
            .ok_or_else(|| QueueError::not_found(video_id.as_str()))?;
        if item.state != QueueItemState::Pending {
            return Err(QueueError::invalid_operation(format!(
                "cannot pause item in state {}",
                item.state
            )));
        }
        item.state = QueueItemState::Paused;
        drop(inner);
        self.bus.publish(
            Event::new(EventKind::UploadPaused, "upload paused").with_video(video_id.to_string()),
        );
        self.publish_state();
        Ok(())
    }

    /// Resume one paused item.
    pub fn resume(self: &Arc<Self>, video_id: &VideoId) -> QueueResult<()> {
        {
            let mut inner = self.lock();
            let item = inner
                .pending
                .iter_mut()
                .find(|i| i.video_id == *video_id)
                .ok_or_else(|| QueueError::not_found(video_id.as_str()))?;
            if item.state != QueueItemState::Paused {
                return Err(QueueError::invalid_operation(format!(
                    "cannot resume item in state {}",
                    item.state
                )));
            }
            item.state = QueueItemState::Pending;
        }
        self.bus.publish(
            Event::new(EventKind::UploadResumed, "upload resumed").with_video(video_id.to_string()),
        );
        self.publish_state();
        self.process_next();
        Ok(())
    }

    /// Cancel an item in any live state. An active worker observes the
    /// signal at its next suspension point.
    pub fn cancel(self: &Arc<Self>, video_id: &VideoId) -> QueueResult<()> {
        let mut inner = self.lock();

        if let Some(entry) = inner.active.get(video_id.as_str()) {
            entry.cancel.notify_one();
            debug!(video_id = %video_id, "cancel signalled to active worker");
            return Ok(());
        }

        let index = inner
            .pending
            .iter()
            .position(|i| i.video_id == *video_id)
            .ok_or_else(|| QueueError::not_found(video_id.as_str()))?;
        let mut item = inner.pending.remove(index);
        item.state = QueueItemState::Cancelled;
        item.completed_at = Some(Utc::now());
        Self::push_history(&mut inner, &self.config, item);
        drop(inner);

        self.bus.publish(
            Event::new(EventKind::UploadCancelled, "upload cancelled")
                .with_video(video_id.to_string()),
        );
        self.publish_state();
        Ok(())
    }

    /// Change a pending item's priority; takes effect at next admission.
    pub fn set_priority(&self, video_id: &VideoId, priority: i32) -> QueueResult<()> {
        let mut inner = self.lock();
        let item = inner
            .pending
            .iter_mut()
            .find(|i| i.video_id == *video_id)
            .ok_or_else(|| QueueError::not_found(video_id.as_str()))?;
        item.priority = priority;
        Ok(())
    }

    /// Stop admitting new items; in-flight work continues.
    pub fn pause_all(&self) {
        self.lock().is_paused = true;
        info!("queue admission paused");
        self.publish_state();
    }

    /// Resume admission.
    pub fn resume_all(self: &Arc<Self>) {
        self.lock().is_paused = false;
        info!("queue admission resumed");
        self.publish_state();
        self.process_next();
    }

    /// Paged snapshot of live items and history.
    pub fn get_status(&self, query: &StatusQuery) -> QueueStatusPage {
        let inner = self.lock();

        let mut live: Vec<QueueItem> = inner.active.values().map(|e| e.item.clone()).collect();
        let mut pending: Vec<QueueItem> = inner.pending.clone();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.added_at.cmp(&b.added_at)));
        live.extend(pending);

        let total = live.len();
        let items = page(live, query.offset, query.limit);

        let history_all: Vec<QueueItem> = inner.history.iter().rev().cloned().collect();
        let history_total = history_all.len();
        let history = page(history_all, query.history_offset, query.history_limit);

        QueueStatusPage {
            items,
            history,
            total,
            history_total,
            is_paused: inner.is_paused,
            active: inner.active.len(),
        }
    }

    /// Update progress numbers for an active item.
    pub fn update_progress(&self, video_id: &VideoId, progress: f64, speed: f64, eta: f64) {
        let mut inner = self.lock();
        if let Some(entry) = inner.active.get_mut(video_id.as_str()) {
            entry.item.progress = progress.clamp(0.0, 100.0);
            entry.item.speed = speed;
            entry.item.eta = eta;
        }
        drop(inner);
        self.bus.publish(
            Event::new(EventKind::UploadProgress, format!("{progress:.1}%"))
                .with_video(video_id.to_string())
                .with_data(serde_json::json!({
                    "progress": progress, "speed": speed, "eta": eta,
                })),
        );
    }

    /// Drop terminal history.
    pub fn clear_history(&self) -> usize {
        let mut inner = self.lock();
        let cleared = inner.history.len();
        inner.history.clear();
        cleared
    }

    /// Drop everything that is not actively running; active items are
    /// signalled to cancel.
    pub fn clear_all(&self) -> usize {
        let mut inner = self.lock();
        let cleared = inner.pending.len() + inner.history.len();
        inner.pending.clear();
        inner.history.clear();
        for entry in inner.active.values() {
            entry.cancel.notify_one();
        }
        drop(inner);
        self.publish_state();
        cleared
    }

    pub(crate) fn push_history(inner: &mut QueueInner, config: &QueueConfig, item: QueueItem) {
        inner.history.push_back(item);
        while inner.history.len() > config.history_limit {
            inner.history.pop_front();
        }
    }

    /// Admit the highest-priority pending items up to the concurrency
    /// cap, spawning a worker for each outside the lock.
    pub(crate) fn process_next(self: &Arc<Self>) {
        let mut launches: Vec<(VideoId, Arc<Notify>)> = Vec::new();
        {
            let mut inner = self.lock();
            if inner.is_paused {
                return;
            }
            while inner.active.len() < self.config.max_concurrent {
                // Highest priority first; FIFO within a priority.
                let next = inner
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, i)| i.state == QueueItemState::Pending)
                    .max_by(|(ai, a), (bi, b)| {
                        a.priority
                            .cmp(&b.priority)
                            .then(b.added_at.cmp(&a.added_at))
                            .then(bi.cmp(ai))
                    })
                    .map(|(index, _)| index);

                let Some(index) = next else { break };
                let mut item = inner.pending.remove(index);
                item.state = QueueItemState::Active;
                item.started_at = Some(Utc::now());
                let cancel = Arc::new(Notify::new());
                let video_id = item.video_id.clone();
                inner.active.insert(
                    video_id.as_str().to_string(),
                    ActiveEntry {
                        item,
                        cancel: Arc::clone(&cancel),
                    },
                );
                launches.push((video_id, cancel));
            }
        }

        for (video_id, cancel) in launches {
            let queue = Arc::clone(self);
            tokio::spawn(async move {
                worker::run_item(queue, video_id, cancel).await;
            });
        }
    }

    /// Move a finished item from active to history and admit the next.
    pub(crate) fn finish_item(
        self: &Arc<Self>,
        video_id: &VideoId,
        state: QueueItemState,
        error: Option<String>,
    ) {
        {
            let mut inner = self.lock();
            if let Some(mut entry) = inner.active.remove(video_id.as_str()) {
                entry.item.state = state;
                entry.item.completed_at = Some(Utc::now());
                entry.item.error = error;
                if state == QueueItemState::Completed {
                    entry.item.progress = 100.0;
                }
                Self::push_history(&mut inner, &self.config, entry.item);
            }
        }
        self.publish_state();
        self.process_next();
    }

    fn publish_state(&self) {
        let inner = self.lock();
        let snapshot = serde_json::json!({
            "pending": inner.pending.len(),
            "active": inner.active.len(),
            "history": inner.history.len(),
            "is_paused": inner.is_paused,
        });
        drop(inner);
        self.bus
            .publish(Event::new(EventKind::QueueState, "queue state").with_data(snapshot));
    }
}

fn page(items: Vec<QueueItem>, offset: usize, limit: usize) -> Vec<QueueItem> {
    if limit == 0 {
        items.into_iter().skip(offset).collect()
    } else {
        items.into_iter().skip(offset).take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgrab_media::{DownloadConfig, Downloader};
    use vgrab_storage::{StorageClient, StorageConfig};
    use vgrab_store::StateStore;

    fn queue(max_concurrent: usize) -> Arc<UploadQueue> {
        let tracker = Arc::new(VideoTracker::new(
            Arc::new(StateStore::in_memory()),
            Arc::new(StorageClient::new(StorageConfig::default())),
            Arc::new(Downloader::new(DownloadConfig::default()).unwrap()),
            Arc::new(EventBus::new()),
        ));
        UploadQueue::new(
            QueueConfig {
                max_concurrent,
                history_limit: 50,
            },
            tracker,
            Arc::new(EventBus::new()),
        )
    }

    /// A queue whose admission is globally paused never launches workers,
    /// which lets membership logic be tested synchronously.
    fn paused_queue() -> Arc<UploadQueue> {
        let queue = queue(1);
        queue.pause_all();
        queue
    }

    #[tokio::test]
    async fn test_priority_orders_admission() {
        let queue = paused_queue();
        queue.add(VideoId::from("v1"), AddOptions { priority: 0, ..Default::default() });
        queue.add(VideoId::from("v2"), AddOptions { priority: 10, ..Default::default() });
        queue.add(VideoId::from("v3"), AddOptions { priority: 5, ..Default::default() });

        let status = queue.get_status(&StatusQuery::default());
        let order: Vec<&str> = status.items.iter().map(|i| i.video_id.as_str()).collect();
        assert_eq!(order, vec!["v2", "v3", "v1"]);
    }

    #[tokio::test]
    async fn test_duplicate_add_promotes_priority() {
        let queue = paused_queue();
        queue.add(VideoId::from("v1"), AddOptions { priority: 1, ..Default::default() });
        queue.add(VideoId::from("v1"), AddOptions { priority: 9, ..Default::default() });

        let status = queue.get_status(&StatusQuery::default());
        assert_eq!(status.items.len(), 1);
        assert_eq!(status.items[0].priority, 9);

        // Lower priority does not demote.
        queue.add(VideoId::from("v1"), AddOptions { priority: 2, ..Default::default() });
        let status = queue.get_status(&StatusQuery::default());
        assert_eq!(status.items[0].priority, 9);
    }

    #[tokio::test]
    async fn test_pause_excludes_from_admission() {
        let queue = paused_queue();
        queue.add(VideoId::from("v1"), AddOptions::default());
        queue.pause(&VideoId::from("v1")).unwrap();

        let status = queue.get_status(&StatusQuery::default());
        assert_eq!(status.items[0].state, QueueItemState::Paused);

        queue.resume(&VideoId::from("v1")).unwrap();
        let status = queue.get_status(&StatusQuery::default());
        assert_eq!(status.items[0].state, QueueItemState::Pending);
    }

    #[tokio::test]
    async fn test_cancel_pending_moves_to_history() {
        let queue = paused_queue();
        queue.add(VideoId::from("v1"), AddOptions::default());
        queue.cancel(&VideoId::from("v1")).unwrap();

        let status = queue.get_status(&StatusQuery::default());
        assert!(status.items.is_empty());
        assert_eq!(status.history.len(), 1);
        assert_eq!(status.history[0].state, QueueItemState::Cancelled);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let queue = paused_queue();
        for i in 0..60 {
            let id = VideoId::from(format!("v{}", i).as_str());
            queue.add(id.clone(), AddOptions::default());
            queue.cancel(&id).unwrap();
        }
        let status = queue.get_status(&StatusQuery::default());
        assert_eq!(status.history_total, 50);
    }

    #[tokio::test]
    async fn test_unknown_item_errors() {
        let queue = paused_queue();
        assert!(queue.pause(&VideoId::from("missing")).is_err());
        assert!(queue.resume(&VideoId::from("missing")).is_err());
        assert!(queue.cancel(&VideoId::from("missing")).is_err());
        assert!(queue.set_priority(&VideoId::from("missing"), 1).is_err());
    }

    #[tokio::test]
    async fn test_clear_all_empties_live_sets() {
        let queue = paused_queue();
        queue.add(VideoId::from("v1"), AddOptions::default());
        queue.add(VideoId::from("v2"), AddOptions::default());
        assert_eq!(queue.clear_all(), 2);
        let status = queue.get_status(&StatusQuery::default());
        assert!(status.items.is_empty());
        assert!(status.history.is_empty());
    }

    #[tokio::test]
    async fn test_pause_all_blocks_admission() {
        // Admission stays blocked while paused even with capacity free.
        let queue = paused_queue();
        queue.add(VideoId::from("v1"), AddOptions::default());
        let status = queue.get_status(&StatusQuery::default());
        assert_eq!(status.active, 0);
        assert!(status.is_paused);
    }
}
