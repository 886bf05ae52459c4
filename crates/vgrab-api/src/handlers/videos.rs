//! Admin video-record endpoints.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;

use vgrab_models::{VideoId, VideoRecord};
use vgrab_tracker::{RetryOptions, SyncOptions, VideoQuery, VideoUpdate};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /admin/api/videos`
pub async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<VideoQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let (records, total) = state.video_tracker.get_all(&query).await?;
    Ok(Json(serde_json::json!({
        "records": records,
        "total": total,
    })))
}

/// `GET /admin/api/videos/:id`
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VideoRecord>> {
    Ok(Json(state.video_tracker.get_by_id(&VideoId::from(id.as_str())).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddVideoRequest {
    pub source_url: Option<String>,
    pub video_url: String,
}

/// `POST /admin/api/videos` — manual add with auto-import.
pub async fn add_video(
    State(state): State<AppState>,
    Json(request): Json<AddVideoRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let source_url = request.source_url.unwrap_or_default();
    let (record, created) = state
        .video_tracker
        .add_video(&source_url, &request.video_url, Vec::new())
        .await?;
    Ok(Json(serde_json::json!({
        "record": record,
        "created": created,
    })))
}

/// `PUT /admin/api/videos/:id`
pub async fn update_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<VideoUpdate>,
) -> ApiResult<Json<VideoRecord>> {
    Ok(Json(
        state
            .video_tracker
            .update_video(&VideoId::from(id.as_str()), &update)
            .await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteVideoQuery {
    #[serde(default)]
    pub delete_from_storage: bool,
}

/// `DELETE /admin/api/videos/:id`
pub async fn delete_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteVideoQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state
        .video_tracker
        .delete_video(&VideoId::from(id.as_str()), query.delete_from_storage)
        .await?;
    if !deleted {
        return Err(ApiError::not_found(id));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// `POST /admin/api/videos/:id/sync`
pub async fn sync_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let (record, outcome) = state
        .video_tracker
        .sync_video(&VideoId::from(id.as_str()), SyncOptions::default())
        .await?;
    Ok(Json(serde_json::json!({
        "record": record,
        "outcome": outcome,
    })))
}

/// `POST /admin/api/videos/sync-all`
pub async fn sync_all(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let (synced, failed) = state.video_tracker.sync_all_pending().await?;
    Ok(Json(serde_json::json!({ "synced": synced, "failed": failed })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReuploadRequest {
    #[serde(default)]
    pub delete_existing: bool,
}

/// `POST /admin/api/videos/:id/reupload`
pub async fn reupload_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ReuploadRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (record, outcome) = state
        .video_tracker
        .reupload_video(&VideoId::from(id.as_str()), request.delete_existing)
        .await?;
    Ok(Json(serde_json::json!({
        "record": record,
        "outcome": outcome,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BulkIdsRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub delete_existing: bool,
    #[serde(default)]
    pub delete_from_storage: bool,
}

fn to_video_ids(ids: &[String]) -> Vec<VideoId> {
    ids.iter().map(|id| VideoId::from(id.as_str())).collect()
}

/// `POST /admin/api/videos/bulk-sync`
pub async fn bulk_sync(
    State(state): State<AppState>,
    Json(request): Json<BulkIdsRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (synced, failed) = state
        .video_tracker
        .sync_many(&to_video_ids(&request.ids))
        .await?;
    Ok(Json(serde_json::json!({ "synced": synced, "failed": failed })))
}

/// `POST /admin/api/videos/bulk-reupload`
pub async fn bulk_reupload(
    State(state): State<AppState>,
    Json(request): Json<BulkIdsRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (synced, failed) = state
        .video_tracker
        .reupload_many(&to_video_ids(&request.ids), request.delete_existing)
        .await?;
    Ok(Json(serde_json::json!({ "synced": synced, "failed": failed })))
}

/// `POST /admin/api/videos/bulk-delete`
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkIdsRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state
        .video_tracker
        .delete_many(&to_video_ids(&request.ids), request.delete_from_storage)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default = "default_true")]
    pub skip_protected: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

/// `POST /admin/api/videos/retry-failed`
pub async fn retry_failed(
    State(state): State<AppState>,
    Json(request): Json<RetryRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let (attempted, synced) = state
        .video_tracker
        .retry_all_failed(RetryOptions {
            skip_protected: request.skip_protected,
            max_retries: request.max_retries,
        })
        .await?;
    Ok(Json(serde_json::json!({
        "attempted": attempted,
        "synced": synced,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetStuckRequest {
    #[serde(default = "default_stuck_minutes")]
    pub timeout_minutes: i64,
}

fn default_stuck_minutes() -> i64 {
    30
}

/// `POST /admin/api/videos/reset-stuck`
pub async fn reset_stuck(
    State(state): State<AppState>,
    Json(request): Json<ResetStuckRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let reset = state
        .video_tracker
        .reset_stuck_uploads(request.timeout_minutes)
        .await?;
    Ok(Json(serde_json::json!({ "reset": reset })))
}

/// `GET /admin/api/videos/:id/download` — serve the cached local file,
/// or redirect to the public storage URL.
pub async fn download_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let record = state
        .video_tracker
        .get_by_id(&VideoId::from(id.as_str()))
        .await?;

    if let Some(path) = &record.download_path {
        if let Ok(bytes) = tokio::fs::read(path).await {
            let content_type = record
                .download_content_type
                .clone()
                .unwrap_or_else(|| "video/mp4".to_string());
            return Ok((
                [(header::CONTENT_TYPE, content_type)],
                bytes,
            )
                .into_response());
        }
    }

    match &record.s3_url {
        Some(s3_url) => Ok(Redirect::temporary(s3_url).into_response()),
        None => Err(ApiError::not_found("video has no stored copy")),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// `GET /admin/api/videos/export` — CSV or JSON dump.
pub async fn export_videos(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let records = state.video_tracker.all().await?;

    match query.format.as_deref() {
        Some("csv") => {
            let mut csv = String::from(
                "id,source_url,video_url,status,s3_url,is_protected,retry_count,created_at\n",
            );
            for record in &records {
                csv.push_str(&format!(
                    "{},{},{},{},{},{},{},{}\n",
                    record.id,
                    csv_field(&record.source_url),
                    csv_field(&record.video_url),
                    record.status,
                    csv_field(record.s3_url.as_deref().unwrap_or("")),
                    record.is_protected,
                    record.retry_count,
                    record.created_at.to_rfc3339(),
                ));
            }
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"videos.csv\"",
                    ),
                ],
                csv,
            )
                .into_response())
        }
        _ => Ok(Json(records).into_response()),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_field_escaping() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
