//! Dashboard, cache and health endpoints.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use vgrab_queue::StatusQuery;

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pool = state.pool.stats().await;
    Json(serde_json::json!({
        "status": "ok",
        "redis": state.store.remote_available(),
        "storage_configured": state.storage.is_configured(),
        "browsers": pool.browsers.len(),
    }))
}

/// `GET /admin/api/dashboard` — aggregated counts.
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let urls = state.url_tracker.counts().await?;
    let videos = state.video_tracker.stats().await?;
    let queue = state.queue.get_status(&StatusQuery::default());
    let cache = state.cache.stats().await;
    let pool = state.pool.stats().await;

    Ok(Json(serde_json::json!({
        "urls": urls,
        "videos": videos,
        "queue": {
            "live": queue.total,
            "active": queue.active,
            "history": queue.history_total,
            "is_paused": queue.is_paused,
        },
        "cache": cache,
        "browser_pool": pool,
    })))
}

/// `GET /admin/api/browser/processes`
pub async fn browser_processes(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "processes": state.pool.process_info().await,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_pattern() -> String {
    "*".to_string()
}

/// `POST /admin/api/cache/clear`
pub async fn clear_cache(
    State(state): State<AppState>,
    Json(request): Json<ClearCacheRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let cleared = state.cache.clear(&request.pattern).await;
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

/// `GET /admin/api/cache/stats`
pub async fn cache_stats(State(state): State<AppState>) -> Json<vgrab_store::CacheStats> {
    Json(state.cache.stats().await)
}
