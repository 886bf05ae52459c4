//! Router assembly.

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handlers::{dashboard, logs, scrape, storage, upload_queue, urls, videos};
use crate::middleware::{request_id, request_logging};
use crate::state::AppState;

/// Create the gateway router.
pub fn create_router(state: AppState) -> Router {
    let scrape_routes = Router::new().route("/apis/scrape/v1/:engine", get(scrape::scrape));

    let url_routes = Router::new()
        .route("/urls", get(urls::list_urls))
        .route("/urls/bulk-delete", post(urls::bulk_delete_urls))
        .route("/urls/:id", get(urls::get_url))
        .route("/urls/:id", delete(urls::delete_url))
        .route("/urls/:id/cancel", post(urls::cancel_url))
        .route("/urls/:id/rescrape", post(urls::rescrape_url))
        .route("/urls/:id/response", get(urls::url_response));

    let video_routes = Router::new()
        .route("/videos", get(videos::list_videos))
        .route("/videos", post(videos::add_video))
        .route("/videos/sync-all", post(videos::sync_all))
        .route("/videos/bulk-sync", post(videos::bulk_sync))
        .route("/videos/bulk-reupload", post(videos::bulk_reupload))
        .route("/videos/bulk-delete", post(videos::bulk_delete))
        .route("/videos/retry-failed", post(videos::retry_failed))
        .route("/videos/reset-stuck", post(videos::reset_stuck))
        .route("/videos/export", get(videos::export_videos))
        .route("/videos/:id", get(videos::get_video))
        .route("/videos/:id", put(videos::update_video))
        .route("/videos/:id", delete(videos::delete_video))
        .route("/videos/:id/sync", post(videos::sync_video))
        .route("/videos/:id/reupload", post(videos::reupload_video))
        .route("/videos/:id/download", get(videos::download_video));

    let queue_routes = Router::new()
        .route("/upload-queue/status", get(upload_queue::status))
        .route("/upload-queue/add", post(upload_queue::add))
        .route("/upload-queue/pause-all", post(upload_queue::pause_all))
        .route("/upload-queue/resume-all", post(upload_queue::resume_all))
        .route("/upload-queue/clear", post(upload_queue::clear))
        .route("/upload-queue/reset-all", post(upload_queue::reset_all))
        .route("/upload-queue/:id/pause", post(upload_queue::pause))
        .route("/upload-queue/:id/resume", post(upload_queue::resume))
        .route("/upload-queue/:id/cancel", post(upload_queue::cancel))
        .route("/upload-queue/:id/priority", post(upload_queue::set_priority));

    let storage_routes = Router::new()
        .route("/storage/status", get(storage::status))
        .route("/storage/test", post(storage::test_connection))
        .route("/storage/scan", post(storage::scan))
        .route("/storage/reconcile", post(storage::reconcile))
        .route("/storage/orphans", get(storage::orphans))
        .route("/storage/orphans/import", post(storage::import_orphan))
        .route("/storage/orphans/bulk-import", post(storage::bulk_import_orphans))
        .route("/storage/orphans/bulk-delete", post(storage::bulk_delete_orphans))
        .route("/storage/fix-missing", post(storage::fix_missing))
        .route("/storage/clear-cache", post(storage::clear_cache));

    let misc_routes = Router::new()
        .route("/dashboard", get(dashboard::dashboard))
        .route("/browser/processes", get(dashboard::browser_processes))
        .route("/cache/clear", post(dashboard::clear_cache))
        .route("/cache/stats", get(dashboard::cache_stats))
        .route("/logs/stream", get(logs::stream));

    let admin_routes = Router::new()
        .merge(url_routes)
        .merge(video_routes)
        .merge(queue_routes)
        .merge(storage_routes)
        .merge(misc_routes);

    Router::new()
        .merge(scrape_routes)
        .nest("/admin/api", admin_routes)
        .route("/health", get(dashboard::health))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
