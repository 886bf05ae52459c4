//! Video tracker: authoritative per-asset state and the sync pipeline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vgrab_events::{Event, EventBus, EventKind};
use vgrab_media::{DownloadProgress, Downloader, TempFileGuard};
use vgrab_models::{
    normalize_video_url, VideoId, VideoRecord, VideoSource, VideoStatus,
};
use vgrab_storage::{StorageClient, UploadMetadata};
use vgrab_store::StateStore;

use crate::error::{TrackerError, TrackerResult};

/// Hash holding video records, field = record ID.
const VIDEOS_HASH: &str = "videos";

/// User-facing message recorded for protected/undownloadable content.
const PROTECTED_MESSAGE: &str =
    "Video is protected or not downloadable from its source";

/// Error-message markers that classify a failure as protected content.
const PROTECTED_MARKERS: &[&str] = &["not a valid video", "obfuscated", "protected"];

/// Options for one sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Bypass the pre-flight HEAD dedup check
    pub force: bool,
}

/// Options for a retry-all pass.
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    /// Leave protected records alone
    pub skip_protected: bool,
    /// Records at or past this retry count are skipped
    pub max_retries: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            skip_protected: true,
            max_retries: 3,
        }
    }
}

/// Progress sample emitted during sync.
#[derive(Debug, Clone, Copy)]
pub enum SyncProgress {
    Download { bytes: u64, elapsed_secs: f64 },
    Upload { bytes: u64, total: u64 },
}

/// How a sync run concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Uploaded a fresh download
    Uploaded,
    /// Existing object found by the pre-flight HEAD
    SkippedExisting,
    /// Record was already synced
    AlreadySynced,
}

/// Filter/pagination parameters for video listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoQuery {
    pub status: Option<VideoStatus>,
    pub search: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
}

/// Partial update applied by the admin API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoUpdate {
    pub video_url: Option<String>,
    pub source_url: Option<String>,
    pub is_protected: Option<bool>,
    pub force_reupload: Option<bool>,
}

/// Aggregate counts for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct VideoStats {
    pub total: usize,
    pub pending: usize,
    pub uploading: usize,
    pub synced: usize,
    pub error: usize,
    pub protected: usize,
    pub auto_imported: usize,
    pub total_synced_bytes: u64,
}

/// Authoritative tracker for discovered media assets.
///
/// All reads and writes are linearized through the state store; each
/// operation read-modify-writes a single record. Concurrent syncs of the
/// same record are rejected via an in-flight set, and concurrent adds are
/// serialized so identical URLs produce one record.
pub struct VideoTracker {
    store: Arc<StateStore>,
    storage: Arc<StorageClient>,
    downloader: Arc<Downloader>,
    bus: Arc<EventBus>,
    add_lock: Mutex<()>,
    syncing: StdMutex<HashSet<String>>,
}

/// Removes the record from the in-flight set on every exit path.
struct SyncSlot<'a> {
    tracker: &'a VideoTracker,
    id: String,
}

impl Drop for SyncSlot<'_> {
    fn drop(&mut self) {
        if let Ok(mut syncing) = self.tracker.syncing.lock() {
            syncing.remove(&self.id);
        }
    }
}

impl VideoTracker {
    pub fn new(
        store: Arc<StateStore>,
        storage: Arc<StorageClient>,
        downloader: Arc<Downloader>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            storage,
            downloader,
            bus,
            add_lock: Mutex::new(()),
            syncing: StdMutex::new(HashSet::new()),
        }
    }

    async fn persist(&self, record: &VideoRecord) -> TrackerResult<()> {
        let raw = serde_json::to_string(record)?;
        self.store.hset(VIDEOS_HASH, record.id.as_str(), &raw).await?;
        Ok(())
    }

    /// Persist a record mutated outside the tracker (reconciler imports).
    pub(crate) async fn persist_record(&self, record: &VideoRecord) -> TrackerResult<()> {
        self.persist(record).await
    }

    async fn load(&self, id: &VideoId) -> TrackerResult<VideoRecord> {
        let raw = self
            .store
            .hget(VIDEOS_HASH, id.as_str())
            .await
            .ok_or_else(|| TrackerError::not_found(id.as_str()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Every record, unfiltered.
    pub async fn all(&self) -> TrackerResult<Vec<VideoRecord>> {
        let map = self.store.hgetall(VIDEOS_HASH).await;
        let mut records = Vec::with_capacity(map.len());
        for raw in map.values() {
            match serde_json::from_str::<VideoRecord>(raw) {
                Ok(record) => records.push(record),
                Err(e) => debug!("skipping undecodable video record: {}", e),
            }
        }
        Ok(records)
    }

    /// Add a video, deduplicating by normalized URL and by storage key.
    ///
    /// Returns the record and whether it was newly created. A URL whose
    /// object already exists in storage is imported directly as `synced`.
    pub async fn add_video(
        &self,
        source_url: &str,
        video_url: &str,
        sources: Vec<VideoSource>,
    ) -> TrackerResult<(VideoRecord, bool)> {
        let _guard = self.add_lock.lock().await;

        if let Some(existing) = self.get_by_video_url(video_url).await? {
            debug!(id = %existing.id, "add_video matched existing record");
            return Ok((existing, false));
        }

        let mut record = VideoRecord::new(source_url, video_url);
        record.video_sources = sources;

        // S3 existence auto-import: the object may predate the tracker.
        if self.storage.is_configured() {
            let key = self.storage.key_for(&record.primary_video_url);
            match self.storage.check_object_exists(&key).await {
                Ok(stat) if stat.exists => {
                    record.status = VideoStatus::Synced;
                    record.s3_url = Some(self.storage.get_public_url(&key));
                    record.synced_at = Some(Utc::now());
                    record.download_size = Some(stat.size);
                    record.auto_imported = true;
                    info!(id = %record.id, key, "auto-imported existing object");
                }
                Ok(_) => {}
                Err(e) => warn!("pre-add HEAD failed, creating as pending: {}", e),
            }
        }

        self.persist(&record).await?;
        self.bus.publish(
            Event::new(EventKind::Log, format!("tracked video {}", record.video_url))
                .with_video(record.id.to_string()),
        );
        Ok((record, true))
    }

    /// Fetch one record.
    pub async fn get_by_id(&self, id: &VideoId) -> TrackerResult<VideoRecord> {
        self.load(id).await
    }

    /// Look up by media URL, ignoring query and fragment.
    pub async fn get_by_video_url(&self, url: &str) -> TrackerResult<Option<VideoRecord>> {
        let normalized = normalize_video_url(url);
        Ok(self
            .all()
            .await?
            .into_iter()
            .find(|r| r.normalized_url() == normalized))
    }

    /// All records discovered on one page.
    pub async fn get_by_source_url(&self, source_url: &str) -> TrackerResult<Vec<VideoRecord>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|r| r.source_url == source_url)
            .collect())
    }

    /// Filtered, paginated listing with the pre-pagination total.
    pub async fn get_all(&self, query: &VideoQuery) -> TrackerResult<(Vec<VideoRecord>, usize)> {
        let mut records = self.all().await?;

        if let Some(status) = query.status {
            records.retain(|r| r.status == status);
        }
        if let Some(search) = &query.search {
            let needle = search.to_ascii_lowercase();
            records.retain(|r| {
                r.video_url.to_ascii_lowercase().contains(&needle)
                    || r.source_url.to_ascii_lowercase().contains(&needle)
            });
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = records.len();
        let page = if query.limit == 0 {
            records.into_iter().skip(query.offset).collect()
        } else {
            records
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .collect()
        };
        Ok((page, total))
    }

    /// Apply a partial update.
    pub async fn update_video(
        &self,
        id: &VideoId,
        update: &VideoUpdate,
    ) -> TrackerResult<VideoRecord> {
        let mut record = self.load(id).await?;
        if let Some(video_url) = &update.video_url {
            record.video_url = video_url.clone();
            record.primary_video_url = video_url.clone();
        }
        if let Some(source_url) = &update.source_url {
            record.source_url = source_url.clone();
        }
        if let Some(is_protected) = update.is_protected {
            record.is_protected = is_protected;
        }
        if let Some(force_reupload) = update.force_reupload {
            record.force_reupload = force_reupload;
        }
        self.persist(&record).await?;
        Ok(record)
    }

    /// Delete one record, optionally removing its object from storage.
    pub async fn delete_video(
        &self,
        id: &VideoId,
        delete_from_storage: bool,
    ) -> TrackerResult<bool> {
        let record = match self.load(id).await {
            Ok(record) => record,
            Err(TrackerError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        if delete_from_storage {
            if let Some(s3_url) = &record.s3_url {
                if let Some(key) = self.storage.extract_key_from_url(s3_url) {
                    if let Err(e) = self.storage.delete_object(&key).await {
                        warn!(id = %id, "failed to delete object {}: {}", key, e);
                    }
                }
            }
        }
        if let Some(path) = &record.download_path {
            TempFileGuard::new(path).cleanup();
        }

        Ok(self.store.hdel(VIDEOS_HASH, id.as_str()).await)
    }

    /// Delete several records.
    pub async fn delete_many(
        &self,
        ids: &[VideoId],
        delete_from_storage: bool,
    ) -> TrackerResult<usize> {
        let mut removed = 0;
        for id in ids {
            if self.delete_video(id, delete_from_storage).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete every record discovered on one page.
    pub async fn delete_by_source_url(
        &self,
        source_url: &str,
        delete_from_storage: bool,
    ) -> TrackerResult<usize> {
        let ids: Vec<VideoId> = self
            .get_by_source_url(source_url)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        self.delete_many(&ids, delete_from_storage).await
    }

    /// Run the download→validate→upload pipeline for one record.
    pub async fn sync_video(
        &self,
        id: &VideoId,
        options: SyncOptions,
    ) -> TrackerResult<(VideoRecord, SyncOutcome)> {
        self.sync_video_with_progress(id, options, |_| {}).await
    }

    /// `sync_video` with a progress callback for queue display.
    pub async fn sync_video_with_progress<F>(
        &self,
        id: &VideoId,
        options: SyncOptions,
        on_progress: F,
    ) -> TrackerResult<(VideoRecord, SyncOutcome)>
    where
        F: Fn(SyncProgress) + Send + Sync + 'static,
    {
        // Sync must not run concurrently with itself for one record.
        let _slot = {
            let mut syncing = self
                .syncing
                .lock()
                .map_err(|_| TrackerError::invalid_state("sync set poisoned"))?;
            if !syncing.insert(id.to_string()) {
                return Err(TrackerError::SyncInProgress(id.to_string()));
            }
            SyncSlot {
                tracker: self,
                id: id.to_string(),
            }
        };

        let mut record = self.load(id).await?;
        if record.status == VideoStatus::Synced && !record.force_reupload && !options.force {
            return Ok((record, SyncOutcome::AlreadySynced));
        }

        let force = options.force || record.force_reupload;
        let key = self.storage.key_for(&record.video_url);

        // Pre-flight dedup: an object under this key satisfies the sync.
        if !force {
            match self.storage.check_object_exists(&key).await {
                Ok(stat) if stat.exists => {
                    record.mark_synced(self.storage.get_public_url(&key));
                    record.skipped_upload = true;
                    record.clear_download();
                    self.persist(&record).await?;
                    info!(id = %id, key, "sync satisfied by existing object");
                    return Ok((record, SyncOutcome::SkippedExisting));
                }
                Ok(_) => {}
                Err(e) => warn!(id = %id, "pre-flight HEAD failed: {}", e),
            }
        }

        record.status = VideoStatus::Uploading;
        record.uploading_at = Some(Utc::now());
        self.persist(&record).await?;
        self.bus.publish(
            Event::new(EventKind::UploadStart, format!("uploading {}", record.video_url))
                .with_video(id.to_string()),
        );

        match self
            .run_pipeline(&mut record, &key, Arc::new(on_progress))
            .await
        {
            Ok(()) => {
                self.persist(&record).await?;
                self.bus.publish(
                    Event::new(EventKind::UploadComplete, format!("synced {}", record.video_url))
                        .with_video(id.to_string()),
                );
                Ok((record, SyncOutcome::Uploaded))
            }
            Err(e) => {
                let message = e.to_string();
                if PROTECTED_MARKERS
                    .iter()
                    .any(|m| message.to_ascii_lowercase().contains(m))
                {
                    record.is_protected = true;
                    record.mark_error(PROTECTED_MESSAGE);
                } else {
                    record.mark_error(&message);
                }
                self.persist(&record).await?;
                self.bus.publish(
                    Event::new(EventKind::UploadError, message.clone())
                        .with_video(id.to_string()),
                );
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        record: &mut VideoRecord,
        key: &str,
        on_progress: Arc<dyn Fn(SyncProgress) + Send + Sync>,
    ) -> TrackerResult<()> {
        // Reuse a still-present local download; anything else re-downloads.
        let mut reusable = None;
        if let Some(path) = &record.download_path {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                reusable = Some(TempFileGuard::new(path));
            }
        }

        let (guard, size, content_type) = match reusable {
            Some(guard) => {
                debug!(id = %record.id, "reusing cached download");
                let size = record.download_size.unwrap_or(0);
                let content_type = record
                    .download_content_type
                    .clone()
                    .unwrap_or_else(|| "video/mp4".to_string());
                (guard, size, content_type)
            }
            None => self.download_any_source(record, Arc::clone(&on_progress)).await?,
        };

        // Record the local file so a crash before upload can reuse it.
        record.download_path = Some(guard.path().to_string_lossy().to_string());
        record.download_size = Some(size);
        record.download_content_type = Some(content_type.clone());
        record.downloaded_at = Some(Utc::now());
        self.persist(record).await?;

        let metadata = UploadMetadata {
            video_url: Some(record.video_url.clone()),
            source_url: Some(record.source_url.clone()),
            uploaded_at: Some(Utc::now().to_rfc3339()),
        };
        let progress = Arc::clone(&on_progress);
        let s3_url = self
            .storage
            .upload_from_file_with_progress(
                guard.path(),
                key,
                &content_type,
                &metadata,
                move |bytes, total| progress(SyncProgress::Upload { bytes, total }),
            )
            .await?;

        record.mark_synced(s3_url);
        record.skipped_upload = false;
        record.clear_download();
        guard.cleanup();
        Ok(())
    }

    /// Try the current URL first, then the remaining sources, recording
    /// each failure on the record.
    async fn download_any_source(
        &self,
        record: &mut VideoRecord,
        on_progress: Arc<dyn Fn(SyncProgress) + Send + Sync>,
    ) -> TrackerResult<(TempFileGuard, u64, String)> {
        let mut attempts: Vec<(usize, String, bool)> = Vec::new();
        attempts.push((0, record.video_url.clone(), is_hls_source(record, &record.video_url)));
        for (index, source) in record.video_sources.iter().enumerate() {
            if normalize_video_url(&source.url) != record.normalized_url() {
                attempts.push((index, source.url.clone(), source.is_hls));
            }
        }

        self.bus.publish(
            Event::new(EventKind::DownloadStart, format!("downloading {}", record.video_url))
                .with_video(record.id.to_string()),
        );

        let mut last_error: Option<TrackerError> = None;
        for (attempt_number, (source_index, url, is_hls)) in attempts.into_iter().enumerate() {
            let progress = Arc::clone(&on_progress);
            let result = self
                .downloader
                .download(
                    &url,
                    Some(record.source_url.as_str()),
                    None,
                    is_hls,
                    move |p: DownloadProgress| {
                        progress(SyncProgress::Download {
                            bytes: p.bytes,
                            elapsed_secs: p.elapsed_secs,
                        })
                    },
                )
                .await;

            match result {
                Ok(file) => {
                    record.downloaded_source_index = Some(source_index);
                    self.bus.publish(
                        Event::new(EventKind::DownloadComplete, format!("downloaded {}", url))
                            .with_video(record.id.to_string()),
                    );
                    return Ok((file.guard, file.size, file.content_type));
                }
                Err(e) => {
                    warn!(id = %record.id, url, "source failed: {}", e);
                    record.failed_attempts.push(vgrab_models::FailedAttempt {
                        source_index,
                        attempt: attempt_number as u32 + 1,
                        url: url.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    self.bus.publish(
                        Event::new(EventKind::DownloadError, e.to_string())
                            .with_video(record.id.to_string()),
                    );
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| TrackerError::invalid_state("no download sources available")))
    }

    /// Reset and re-run the pipeline for an already-archived record.
    ///
    /// Applicable from `synced`, `error`, or a stuck `uploading`.
    pub async fn reupload_video(
        &self,
        id: &VideoId,
        delete_existing: bool,
    ) -> TrackerResult<(VideoRecord, SyncOutcome)> {
        let record = self.load(id).await?;
        if record.status == VideoStatus::Pending {
            return Err(TrackerError::invalid_state(
                "record is pending; use sync instead of reupload",
            ));
        }

        if delete_existing {
            if let Some(s3_url) = &record.s3_url {
                if let Some(key) = self.storage.extract_key_from_url(s3_url) {
                    if let Err(e) = self.storage.delete_object(&key).await {
                        warn!(id = %id, "failed to delete existing object: {}", e);
                    }
                }
            }
        }

        self.reset_for_reupload(id).await?;
        self.sync_video(id, SyncOptions { force: true }).await
    }

    /// Return a record to `pending`, clearing sync state and flagging the
    /// next sync to bypass dedup.
    pub async fn reset_for_reupload(&self, id: &VideoId) -> TrackerResult<VideoRecord> {
        let mut record = self.load(id).await?;
        record.status = VideoStatus::Pending;
        record.s3_url = None;
        record.synced_at = None;
        record.uploading_at = None;
        record.error = None;
        record.skipped_upload = false;
        record.force_reupload = true;
        record.clear_download();
        self.persist(&record).await?;
        Ok(record)
    }

    /// Sync every pending record sequentially. Returns (synced, failed).
    pub async fn sync_all_pending(&self) -> TrackerResult<(usize, usize)> {
        let pending: Vec<VideoId> = self
            .all()
            .await?
            .into_iter()
            .filter(|r| r.status == VideoStatus::Pending)
            .map(|r| r.id)
            .collect();

        let mut synced = 0;
        let mut failed = 0;
        for id in pending {
            match self.sync_video(&id, SyncOptions::default()).await {
                Ok(_) => synced += 1,
                Err(e) => {
                    warn!(id = %id, "sync failed: {}", e);
                    failed += 1;
                }
            }
        }
        Ok((synced, failed))
    }

    /// Sync a specific set of records. Returns (synced, failed).
    pub async fn sync_many(&self, ids: &[VideoId]) -> TrackerResult<(usize, usize)> {
        let mut synced = 0;
        let mut failed = 0;
        for id in ids {
            match self.sync_video(id, SyncOptions::default()).await {
                Ok(_) => synced += 1,
                Err(e) => {
                    warn!(id = %id, "sync failed: {}", e);
                    failed += 1;
                }
            }
        }
        Ok((synced, failed))
    }

    /// Reupload a specific set of records. Returns (synced, failed).
    pub async fn reupload_many(
        &self,
        ids: &[VideoId],
        delete_existing: bool,
    ) -> TrackerResult<(usize, usize)> {
        let mut synced = 0;
        let mut failed = 0;
        for id in ids {
            match self.reupload_video(id, delete_existing).await {
                Ok(_) => synced += 1,
                Err(e) => {
                    warn!(id = %id, "reupload failed: {}", e);
                    failed += 1;
                }
            }
        }
        Ok((synced, failed))
    }

    /// Retry every errored record within the retry budget.
    /// Returns (attempted, synced).
    pub async fn retry_all_failed(&self, options: RetryOptions) -> TrackerResult<(usize, usize)> {
        let failed: Vec<VideoRecord> = self
            .all()
            .await?
            .into_iter()
            .filter(|r| r.status == VideoStatus::Error)
            .collect();

        let mut attempted = 0;
        let mut synced = 0;
        for record in failed {
            if options.skip_protected && record.is_protected {
                continue;
            }
            if record.retry_count >= options.max_retries {
                debug!(id = %record.id, "retry budget exhausted");
                continue;
            }

            let mut fresh = self.load(&record.id).await?;
            fresh.retry_count += 1;
            fresh.clear_download();
            self.persist(&fresh).await?;

            attempted += 1;
            if self.sync_video(&record.id, SyncOptions::default()).await.is_ok() {
                synced += 1;
            }
        }
        Ok((attempted, synced))
    }

    /// Return records stuck in `uploading` to `pending`.
    ///
    /// A record is stuck when `uploading_at` is older than the threshold,
    /// typically after a worker crash or hard shutdown.
    pub async fn reset_stuck_uploads(&self, timeout_minutes: i64) -> TrackerResult<usize> {
        let cutoff = Utc::now() - ChronoDuration::minutes(timeout_minutes);
        let stuck: Vec<VideoRecord> = self
            .all()
            .await?
            .into_iter()
            .filter(|r| {
                r.status == VideoStatus::Uploading
                    && r.uploading_at.map(|at| at < cutoff).unwrap_or(true)
            })
            .collect();

        let count = stuck.len();
        for mut record in stuck {
            record.status = VideoStatus::Pending;
            record.uploading_at = None;
            record.error = Some(format!(
                "upload stalled for over {} minutes and was reset",
                timeout_minutes
            ));
            record.clear_download();
            self.persist(&record).await?;
            info!(id = %record.id, "reset stuck upload");
        }
        Ok(count)
    }

    /// Aggregate counts.
    pub async fn stats(&self) -> TrackerResult<VideoStats> {
        let records = self.all().await?;
        let mut stats = VideoStats {
            total: records.len(),
            pending: 0,
            uploading: 0,
            synced: 0,
            error: 0,
            protected: 0,
            auto_imported: 0,
            total_synced_bytes: 0,
        };
        for record in &records {
            match record.status {
                VideoStatus::Pending => stats.pending += 1,
                VideoStatus::Uploading => stats.uploading += 1,
                VideoStatus::Synced => {
                    stats.synced += 1;
                    stats.total_synced_bytes += record.download_size.unwrap_or(0);
                }
                VideoStatus::Error => stats.error += 1,
            }
            if record.is_protected {
                stats.protected += 1;
            }
            if record.auto_imported {
                stats.auto_imported += 1;
            }
        }
        Ok(stats)
    }
}

fn is_hls_source(record: &VideoRecord, url: &str) -> bool {
    record
        .video_sources
        .iter()
        .find(|s| s.url == url)
        .map(|s| s.is_hls)
        .unwrap_or_else(|| vgrab_models::is_hls_url(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgrab_media::DownloadConfig;
    use vgrab_storage::StorageConfig;

    fn tracker() -> VideoTracker {
        VideoTracker::new(
            Arc::new(StateStore::in_memory()),
            Arc::new(StorageClient::new(StorageConfig::default())),
            Arc::new(Downloader::new(DownloadConfig::default()).unwrap()),
            Arc::new(EventBus::new()),
        )
    }

    #[tokio::test]
    async fn test_add_video_dedupes_by_normalized_url() {
        let tracker = tracker();
        let (first, created) = tracker
            .add_video("https://page", "https://v/clip.mp4?tok=1", vec![])
            .await
            .unwrap();
        assert!(created);

        let (second, created) = tracker
            .add_video("https://page", "https://v/clip.mp4?tok=2", vec![])
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_concurrent_adds_produce_one_record() {
        let tracker = Arc::new(tracker());
        let mut handles = Vec::new();
        for i in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker
                    .add_video("https://page", &format!("https://v/clip.mp4?t={}", i), vec![])
                    .await
                    .unwrap()
                    .0
                    .id
            }));
        }
        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().to_string());
        }
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_stuck_uploads() {
        let tracker = tracker();
        let (record, _) = tracker
            .add_video("https://page", "https://v/clip.mp4", vec![])
            .await
            .unwrap();

        let mut stale = tracker.get_by_id(&record.id).await.unwrap();
        stale.status = VideoStatus::Uploading;
        stale.uploading_at = Some(Utc::now() - ChronoDuration::minutes(90));
        stale.download_path = Some("/tmp/gone.mp4".to_string());
        tracker.persist(&stale).await.unwrap();

        let reset = tracker.reset_stuck_uploads(30).await.unwrap();
        assert_eq!(reset, 1);

        let record = tracker.get_by_id(&record.id).await.unwrap();
        assert_eq!(record.status, VideoStatus::Pending);
        assert!(record.download_path.is_none());
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn test_recent_uploading_not_reset() {
        let tracker = tracker();
        let (record, _) = tracker
            .add_video("https://page", "https://v/clip.mp4", vec![])
            .await
            .unwrap();

        let mut live = tracker.get_by_id(&record.id).await.unwrap();
        live.status = VideoStatus::Uploading;
        live.uploading_at = Some(Utc::now());
        tracker.persist(&live).await.unwrap();

        assert_eq!(tracker.reset_stuck_uploads(30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_for_reupload_clears_sync_state() {
        let tracker = tracker();
        let (record, _) = tracker
            .add_video("https://page", "https://v/clip.mp4", vec![])
            .await
            .unwrap();

        let mut synced = tracker.get_by_id(&record.id).await.unwrap();
        synced.mark_synced("https://bucket/clip.mp4");
        tracker.persist(&synced).await.unwrap();

        let reset = tracker.reset_for_reupload(&record.id).await.unwrap();
        assert_eq!(reset.status, VideoStatus::Pending);
        assert!(reset.s3_url.is_none());
        assert!(reset.synced_at.is_none());
        assert!(reset.force_reupload);
    }

    #[tokio::test]
    async fn test_retry_skips_protected_and_exhausted() {
        let tracker = tracker();
        let (a, _) = tracker
            .add_video("https://page", "https://v/a.mp4", vec![])
            .await
            .unwrap();
        let (b, _) = tracker
            .add_video("https://page", "https://v/b.mp4", vec![])
            .await
            .unwrap();

        let mut protected = tracker.get_by_id(&a.id).await.unwrap();
        protected.mark_error("protected content");
        protected.is_protected = true;
        tracker.persist(&protected).await.unwrap();

        let mut exhausted = tracker.get_by_id(&b.id).await.unwrap();
        exhausted.mark_error("boom");
        exhausted.retry_count = 3;
        tracker.persist(&exhausted).await.unwrap();

        let (attempted, _) = tracker.retry_all_failed(RetryOptions::default()).await.unwrap();
        assert_eq!(attempted, 0);
    }

    #[tokio::test]
    async fn test_delete_video() {
        let tracker = tracker();
        let (record, _) = tracker
            .add_video("https://page", "https://v/clip.mp4", vec![])
            .await
            .unwrap();
        assert!(tracker.delete_video(&record.id, false).await.unwrap());
        assert!(!tracker.delete_video(&record.id, false).await.unwrap());
        assert!(matches!(
            tracker.get_by_id(&record.id).await,
            Err(TrackerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let tracker = tracker();
        tracker
            .add_video("https://page", "https://v/a.mp4", vec![])
            .await
            .unwrap();
        let (b, _) = tracker
            .add_video("https://page", "https://v/b.mp4", vec![])
            .await
            .unwrap();
        let mut errored = tracker.get_by_id(&b.id).await.unwrap();
        errored.mark_error("x");
        tracker.persist(&errored).await.unwrap();

        let stats = tracker.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.error, 1);
    }

    #[tokio::test]
    async fn test_update_video() {
        let tracker = tracker();
        let (record, _) = tracker
            .add_video("https://page", "https://v/a.mp4", vec![])
            .await
            .unwrap();
        let updated = tracker
            .update_video(
                &record.id,
                &VideoUpdate {
                    is_protected: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_protected);
    }
}
