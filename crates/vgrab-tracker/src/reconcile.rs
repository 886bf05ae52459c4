//! Storage/tracker inventory reconciliation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vgrab_models::{VideoId, VideoRecord, VideoStatus};
use vgrab_storage::{StorageClient, UploadMetadata};

use crate::error::{TrackerError, TrackerResult};
use crate::videos::VideoTracker;

/// How long a scanned inventory stays fresh.
const INVENTORY_TTL: Duration = Duration::from_secs(5 * 60);

/// Listing page size during scans.
const SCAN_PAGE_SIZE: i32 = 1000;

/// One object in the scanned inventory.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub video_url: Option<String>,
    pub source_url: Option<String>,
    pub uploaded_at: Option<String>,
}

/// Result of a reconcile pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Objects with no matching tracker record
    pub orphan_files: Vec<InventoryEntry>,
    /// Key matches a record but the recorded URL differs from the
    /// object's `x-video-url` metadata
    pub out_of_sync: Vec<OutOfSyncEntry>,
    /// Records claiming `synced` whose object is gone
    pub missing_in_s3: Vec<VideoRecord>,
    /// Records whose object is present and consistent
    pub synced: usize,
    /// Tracker-side pending records
    pub pending: usize,
}

/// A record/object pair that disagree about the media URL.
#[derive(Debug, Clone, Serialize)]
pub struct OutOfSyncEntry {
    pub record: VideoRecord,
    pub object_video_url: Option<String>,
    pub key: String,
}

struct CachedInventory {
    scanned_at: Instant,
    entries: HashMap<String, InventoryEntry>,
}

/// Bidirectional diff between the video tracker and object storage.
///
/// At most one scan runs at a time; readers of a stale (cached)
/// inventory are acceptable. Mutating operations invalidate the cache.
pub struct StorageReconciler {
    storage: Arc<StorageClient>,
    tracker: Arc<VideoTracker>,
    inventory: Mutex<Option<CachedInventory>>,
    scan_lock: Mutex<()>,
}

impl StorageReconciler {
    pub fn new(storage: Arc<StorageClient>, tracker: Arc<VideoTracker>) -> Self {
        Self {
            storage,
            tracker,
            inventory: Mutex::new(None),
            scan_lock: Mutex::new(()),
        }
    }

    /// Walk the store and build the inventory, fetching per-object
    /// metadata. Served from cache within the TTL unless forced.
    pub async fn scan_storage(
        &self,
        force_refresh: bool,
    ) -> TrackerResult<HashMap<String, InventoryEntry>> {
        if !force_refresh {
            if let Some(cached) = self.inventory.lock().await.as_ref() {
                if cached.scanned_at.elapsed() < INVENTORY_TTL {
                    debug!("serving cached inventory");
                    return Ok(cached.entries.clone());
                }
            }
        }

        // Refuse concurrent scans; a second caller gets an error rather
        // than a duplicate walk.
        let _guard = self
            .scan_lock
            .try_lock()
            .map_err(|_| TrackerError::ScanInProgress)?;

        let mut entries = HashMap::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .storage
                .list_objects(token.clone(), None, SCAN_PAGE_SIZE)
                .await?;

            for object in page.objects {
                let metadata = match self.storage.get_object_metadata(&object.key).await {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!(key = %object.key, "metadata fetch failed: {}", e);
                        UploadMetadata::default()
                    }
                };
                entries.insert(
                    object.key.clone(),
                    InventoryEntry {
                        key: object.key,
                        size: object.size,
                        last_modified: object.last_modified,
                        video_url: metadata.video_url,
                        source_url: metadata.source_url,
                        uploaded_at: metadata.uploaded_at,
                    },
                );
            }

            if !page.is_truncated {
                break;
            }
            token = page.next_token;
        }

        info!(objects = entries.len(), "storage scan complete");
        *self.inventory.lock().await = Some(CachedInventory {
            scanned_at: Instant::now(),
            entries: entries.clone(),
        });
        Ok(entries)
    }

    /// Classify every object and record into the reconcile buckets.
    pub async fn reconcile(&self, force_refresh: bool) -> TrackerResult<ReconcileReport> {
        let inventory = self.scan_storage(force_refresh).await?;
        let records = self.tracker.all().await?;

        // Records indexed by their storage key and by normalized URL.
        let mut by_key: HashMap<String, &VideoRecord> = HashMap::new();
        let mut by_url: HashMap<String, &VideoRecord> = HashMap::new();
        for record in &records {
            if let Some(s3_url) = &record.s3_url {
                if let Some(key) = self.storage.extract_key_from_url(s3_url) {
                    by_key.insert(key, record);
                }
            }
            by_url.insert(record.normalized_url(), record);
        }

        let mut report = ReconcileReport::default();

        for entry in inventory.values() {
            let record = by_key.get(&entry.key).copied().or_else(|| {
                entry
                    .video_url
                    .as_ref()
                    .and_then(|url| by_url.get(&vgrab_models::normalize_video_url(url)).copied())
            });

            match record {
                None => report.orphan_files.push(entry.clone()),
                Some(record) => {
                    let object_url = entry.video_url.as_deref();
                    let agrees = object_url
                        .map(|u| {
                            vgrab_models::normalize_video_url(u) == record.normalized_url()
                        })
                        .unwrap_or(true);
                    if agrees {
                        report.synced += 1;
                    } else {
                        report.out_of_sync.push(OutOfSyncEntry {
                            record: record.clone(),
                            object_video_url: entry.video_url.clone(),
                            key: entry.key.clone(),
                        });
                    }
                }
            }
        }

        for record in &records {
            match record.status {
                VideoStatus::Pending => report.pending += 1,
                VideoStatus::Synced => {
                    let key = record
                        .s3_url
                        .as_ref()
                        .and_then(|url| self.storage.extract_key_from_url(url));
                    let present = key.map(|k| inventory.contains_key(&k)).unwrap_or(false);
                    if !present {
                        report.missing_in_s3.push(record.clone());
                    }
                }
                _ => {}
            }
        }

        info!(
            orphans = report.orphan_files.len(),
            out_of_sync = report.out_of_sync.len(),
            missing = report.missing_in_s3.len(),
            synced = report.synced,
            pending = report.pending,
            "reconcile complete"
        );
        Ok(report)
    }

    /// Drop the cached inventory; the next scan walks storage again.
    pub async fn invalidate_cache(&self) {
        self.invalidate().await;
    }

    async fn invalidate(&self) {
        *self.inventory.lock().await = None;
    }

    /// Create a `synced` record for an orphaned object.
    pub async fn import_orphan(&self, key: &str) -> TrackerResult<VideoRecord> {
        let stat = self.storage.check_object_exists(key).await?;
        if !stat.exists {
            return Err(TrackerError::not_found(key));
        }
        let metadata = UploadMetadata::from_map(&stat.metadata);
        let video_url = metadata
            .video_url
            .unwrap_or_else(|| self.storage.get_public_url(key));
        let source_url = metadata.source_url.unwrap_or_default();

        let (mut record, created) = self
            .tracker
            .add_video(&source_url, &video_url, Vec::new())
            .await?;
        if created && record.status != VideoStatus::Synced {
            // add_video HEADs the derived key, which may differ from the
            // orphan's actual key; force the import here.
            record.mark_synced(self.storage.get_public_url(key));
            record.auto_imported = true;
            record.download_size = Some(stat.size);
            self.tracker.persist_record(&record).await?;
        }
        self.invalidate().await;
        info!(key, id = %record.id, "imported orphan");
        Ok(record)
    }

    /// Import several orphans; returns (imported, failed).
    pub async fn import_orphans(&self, keys: &[String]) -> TrackerResult<(usize, usize)> {
        let mut imported = 0;
        let mut failed = 0;
        for key in keys {
            match self.import_orphan(key).await {
                Ok(_) => imported += 1,
                Err(e) => {
                    warn!(key, "orphan import failed: {}", e);
                    failed += 1;
                }
            }
        }
        Ok((imported, failed))
    }

    /// Remove an orphaned object from storage.
    pub async fn delete_orphan(&self, key: &str) -> TrackerResult<()> {
        self.storage.delete_object(key).await?;
        self.invalidate().await;
        info!(key, "deleted orphan");
        Ok(())
    }

    /// Delete several orphans; returns (deleted, failed).
    pub async fn delete_orphans(&self, keys: &[String]) -> TrackerResult<(usize, usize)> {
        let mut deleted = 0;
        let mut failed = 0;
        for key in keys {
            match self.delete_orphan(key).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!(key, "orphan delete failed: {}", e);
                    failed += 1;
                }
            }
        }
        Ok((deleted, failed))
    }

    /// Reset records whose objects vanished back to `pending`.
    pub async fn fix_missing_in_s3(&self, ids: &[VideoId]) -> TrackerResult<usize> {
        let mut fixed = 0;
        for id in ids {
            match self.tracker.reset_for_reupload(id).await {
                Ok(_) => fixed += 1,
                Err(e) => warn!(id = %id, "fix-missing failed: {}", e),
            }
        }
        self.invalidate().await;
        Ok(fixed)
    }
}
