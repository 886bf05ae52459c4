//! Admin upload-queue endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use vgrab_models::{QueueStatusPage, VideoId};
use vgrab_queue::{AddOptions, StatusQuery};

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /admin/api/upload-queue/status`
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<QueueStatusPage>> {
    Ok(Json(state.queue.get_status(&query)))
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub video_id: Option<String>,
    #[serde(default)]
    pub video_ids: Vec<String>,
    #[serde(default)]
    pub priority: i32,
}

/// `POST /admin/api/upload-queue/add` — one or many videos.
pub async fn add(
    State(state): State<AppState>,
    Json(request): Json<AddRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut entries: Vec<(VideoId, AddOptions)> = Vec::new();
    if let Some(id) = &request.video_id {
        entries.push((VideoId::from(id.as_str()), options_for(&state, id, request.priority).await));
    }
    for id in &request.video_ids {
        entries.push((VideoId::from(id.as_str()), options_for(&state, id, request.priority).await));
    }

    let positions = state.queue.add_many(entries);
    Ok(Json(serde_json::json!({ "positions": positions })))
}

async fn options_for(state: &AppState, id: &str, priority: i32) -> AddOptions {
    // Display fields come from the tracker when the record exists.
    let record = state
        .video_tracker
        .get_by_id(&VideoId::from(id))
        .await
        .ok();
    AddOptions {
        priority,
        display_name: record.as_ref().map(|r| r.source_url.clone()),
        display_url: record.as_ref().map(|r| r.video_url.clone()),
    }
}

/// `POST /admin/api/upload-queue/:id/pause`
pub async fn pause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.queue.pause(&VideoId::from(id.as_str()))?;
    Ok(Json(serde_json::json!({ "paused": true })))
}

/// `POST /admin/api/upload-queue/:id/resume`
pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.queue.resume(&VideoId::from(id.as_str()))?;
    Ok(Json(serde_json::json!({ "resumed": true })))
}

/// `POST /admin/api/upload-queue/:id/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.queue.cancel(&VideoId::from(id.as_str()))?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: i32,
}

/// `POST /admin/api/upload-queue/:id/priority`
pub async fn set_priority(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PriorityRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .queue
        .set_priority(&VideoId::from(id.as_str()), request.priority)?;
    Ok(Json(serde_json::json!({ "priority": request.priority })))
}

/// `POST /admin/api/upload-queue/pause-all`
pub async fn pause_all(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.queue.pause_all();
    Ok(Json(serde_json::json!({ "paused": true })))
}

/// `POST /admin/api/upload-queue/resume-all`
pub async fn resume_all(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.queue.resume_all();
    Ok(Json(serde_json::json!({ "resumed": true })))
}

/// `POST /admin/api/upload-queue/clear`
pub async fn clear(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let cleared = state.queue.clear_all();
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

/// `POST /admin/api/upload-queue/reset-all` — clear the queue and return
/// stuck `uploading` records to `pending`.
pub async fn reset_all(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let cleared = state.queue.clear_all();
    let reset = state.video_tracker.reset_stuck_uploads(0).await?;
    Ok(Json(serde_json::json!({ "cleared": cleared, "reset": reset })))
}
