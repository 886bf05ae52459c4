//! Application state.

use std::sync::Arc;

use vgrab_browser::{BrowserConfig, BrowserPool, RenderArtifact, Renderer};
use vgrab_events::EventBus;
use vgrab_media::{DownloadConfig, Downloader};
use vgrab_queue::{QueueConfig, UploadQueue};
use vgrab_storage::StorageClient;
use vgrab_store::{RedisConfig, ScrapeCache, StateStore};
use vgrab_tracker::{StorageReconciler, UrlTracker, VideoTracker};

use crate::config::ApiConfig;

/// Shared application state: every collaborator, lifecycle-controlled
/// from `main` instead of living in module globals.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<StateStore>,
    pub cache: Arc<ScrapeCache<RenderArtifact>>,
    pub pool: Arc<BrowserPool>,
    pub renderer: Arc<Renderer>,
    pub url_tracker: Arc<UrlTracker>,
    pub video_tracker: Arc<VideoTracker>,
    pub reconciler: Arc<StorageReconciler>,
    pub storage: Arc<StorageClient>,
    pub queue: Arc<UploadQueue>,
    pub bus: Arc<EventBus>,
}

impl AppState {
    /// Wire up all components from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(StateStore::new(&RedisConfig::from_env()));
        let cache = Arc::new(ScrapeCache::new(Arc::clone(&store), config.cache_ttl));

        let pool = BrowserPool::new(BrowserConfig::from_env());
        let renderer = Arc::new(Renderer::new(Arc::clone(&pool)));

        let storage = Arc::new(StorageClient::from_env());
        let downloader = Arc::new(Downloader::new(DownloadConfig::from_env())?);
        let bus = Arc::new(EventBus::new());

        let url_tracker = Arc::new(UrlTracker::new(Arc::clone(&store)));
        let video_tracker = Arc::new(VideoTracker::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            downloader,
            Arc::clone(&bus),
        ));
        let reconciler = Arc::new(StorageReconciler::new(
            Arc::clone(&storage),
            Arc::clone(&video_tracker),
        ));
        let queue = UploadQueue::new(
            QueueConfig::default(),
            Arc::clone(&video_tracker),
            Arc::clone(&bus),
        );

        Ok(Self {
            config,
            store,
            cache,
            pool,
            renderer,
            url_tracker,
            video_tracker,
            reconciler,
            storage,
            queue,
            bus,
        })
    }

    /// Start background machinery: pool sweeps, store probes.
    pub async fn start(&self) {
        self.pool.start().await;
        self.store.spawn_probe();
    }

    /// Stop background work and close every browser.
    pub async fn shutdown(&self) {
        self.pool.stop_background().await;
        self.pool.close_all().await;
    }
}
