//! Admin URL-record endpoints.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use vgrab_models::UrlQuery;
use vgrab_store::ScrapeFingerprint;

use crate::error::{ApiError, ApiResult};
use crate::scraper;
use crate::state::AppState;

/// `GET /admin/api/urls`
pub async fn list_urls(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let (records, total) = state.url_tracker.list(&query).await?;
    Ok(Json(serde_json::json!({
        "records": records,
        "total": total,
    })))
}

/// `GET /admin/api/urls/:id`
pub async fn get_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<vgrab_models::UrlRecord>> {
    Ok(Json(state.url_tracker.get(&id).await?))
}

/// `DELETE /admin/api/urls/:id`
pub async fn delete_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.url_tracker.delete(&id).await?;
    if !deleted {
        return Err(ApiError::not_found(id));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// `POST /admin/api/urls/:id/cancel`
pub async fn cancel_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let cancelled = state.url_tracker.cancel(&id).await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

/// `POST /admin/api/urls/:id/rescrape`
pub async fn rescrape_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = scraper::rescrape(&state, &id).await?;
    Ok(Json(serde_json::json!({
        "record": outcome.record,
        "video": outcome.selected_video,
        "cached": outcome.cached,
    })))
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<String>,
}

/// `POST /admin/api/urls/bulk-delete`
pub async fn bulk_delete_urls(
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.url_tracker.delete_many(&request.ids).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// `GET /admin/api/urls/:id/response` — the cached rendered body.
pub async fn url_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let record = state.url_tracker.get(&id).await?;

    // Prefer the exact fingerprint recorded at scrape time; fall back to
    // a bare-URL fingerprint for older records.
    let artifact = match &record.cache_key {
        Some(_) => {
            let fingerprint = ScrapeFingerprint::for_url(&record.url);
            state.cache.get(&fingerprint).await
        }
        None => None,
    };

    match artifact {
        Some(artifact) => Ok((
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            artifact.html,
        )
            .into_response()),
        None => Err(ApiError::not_found("cached response expired or missing")),
    }
}
