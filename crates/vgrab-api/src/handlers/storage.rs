//! Admin storage and reconciliation endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use vgrab_models::VideoId;

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /admin/api/storage/status`
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let config = state.storage.config();
    Ok(Json(serde_json::json!({
        "configured": state.storage.is_configured(),
        "bucket": config.bucket,
        "endpoint": config.endpoint,
        "key_prefix": config.key_prefix,
        "cdn": config.cdn_url,
        "path_style": config.path_style,
    })))
}

/// `POST /admin/api/storage/test` — HEAD the bucket.
pub async fn test_connection(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.storage.validate_connection().await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

/// `POST /admin/api/storage/scan`
pub async fn scan(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let inventory = state.reconciler.scan_storage(query.force_refresh).await?;
    let total_bytes: u64 = inventory.values().map(|e| e.size).sum();
    Ok(Json(serde_json::json!({
        "objects": inventory.len(),
        "total_bytes": total_bytes,
    })))
}

/// `POST /admin/api/storage/reconcile`
pub async fn reconcile(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> ApiResult<Json<vgrab_tracker::ReconcileReport>> {
    Ok(Json(state.reconciler.reconcile(query.force_refresh).await?))
}

/// `GET /admin/api/storage/orphans`
pub async fn orphans(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let report = state.reconciler.reconcile(false).await?;
    Ok(Json(serde_json::json!({
        "orphans": report.orphan_files,
        "total": report.orphan_files.len(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct OrphanKeyRequest {
    pub key: String,
}

/// `POST /admin/api/storage/orphans/import`
pub async fn import_orphan(
    State(state): State<AppState>,
    Json(request): Json<OrphanKeyRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = state.reconciler.import_orphan(&request.key).await?;
    Ok(Json(serde_json::json!({ "record": record })))
}

#[derive(Debug, Deserialize)]
pub struct OrphanKeysRequest {
    pub keys: Vec<String>,
}

/// `POST /admin/api/storage/orphans/bulk-import`
pub async fn bulk_import_orphans(
    State(state): State<AppState>,
    Json(request): Json<OrphanKeysRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (imported, failed) = state.reconciler.import_orphans(&request.keys).await?;
    Ok(Json(serde_json::json!({ "imported": imported, "failed": failed })))
}

/// `POST /admin/api/storage/orphans/bulk-delete`
pub async fn bulk_delete_orphans(
    State(state): State<AppState>,
    Json(request): Json<OrphanKeysRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (deleted, failed) = state.reconciler.delete_orphans(&request.keys).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted, "failed": failed })))
}

#[derive(Debug, Deserialize)]
pub struct FixMissingRequest {
    pub ids: Vec<String>,
}

/// `POST /admin/api/storage/fix-missing`
pub async fn fix_missing(
    State(state): State<AppState>,
    Json(request): Json<FixMissingRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ids: Vec<VideoId> = request
        .ids
        .iter()
        .map(|id| VideoId::from(id.as_str()))
        .collect();
    let fixed = state.reconciler.fix_missing_in_s3(&ids).await?;
    Ok(Json(serde_json::json!({ "fixed": fixed })))
}

/// `POST /admin/api/storage/clear-cache` — drop the scanned inventory.
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.reconciler.invalidate_cache().await;
    Ok(Json(serde_json::json!({ "cleared": true })))
}
