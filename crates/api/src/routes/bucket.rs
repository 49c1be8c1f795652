//! File bucket endpoints.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;

use coffer_infra::BucketArea;

use crate::errors::ApiError;
use crate::state::AppState;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/bucket/covers/:key", get(get_cover))
        .route("/bucket/:area/:key/exists", get(file_exists))
}

pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/bucket/covers", post(upload_cover))
        .route("/bucket/attachments", post(upload_attachment))
        .route("/bucket/:area/:key", get(get_file))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/bucket/:area/:key", delete(delete_file))
}

fn parse_area(area: &str) -> Result<BucketArea, ApiError> {
    BucketArea::parse(area)
        .ok_or_else(|| ApiError::Validation(format!("unknown bucket area: {area}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadCoverQuery {
    file_key: String,
}

async fn upload_cover(
    State(state): State<AppState>,
    Query(query): Query<UploadCoverQuery>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::Validation("cover body is empty".to_string()));
    }

    let key = state.bucket.upload_cover(&query.file_key, &body).await?;
    Ok(Json(serde_json::json!({ "fileKey": key })))
}

#[derive(Debug, Deserialize)]
struct UploadAttachmentQuery {
    #[serde(default = "default_extension")]
    extension: String,
}

fn default_extension() -> String {
    "pdf".to_string()
}

async fn upload_attachment(
    State(state): State<AppState>,
    Query(query): Query<UploadAttachmentQuery>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::Validation("attachment body is empty".to_string()));
    }

    let key = state
        .bucket
        .upload_file(BucketArea::Attachments, &body, &query.extension)
        .await?;

    Ok(Json(serde_json::json!({ "fileKey": key })))
}

async fn get_cover(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    serve_file(&state, BucketArea::Covers, &key).await
}

async fn get_file(
    State(state): State<AppState>,
    Path((area, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    serve_file(&state, parse_area(&area)?, &key).await
}

async fn serve_file(state: &AppState, area: BucketArea, key: &str) -> Result<Response, ApiError> {
    let bytes = state.bucket.read(area, key).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type_for(key))],
        bytes,
    )
        .into_response())
}

async fn file_exists(
    State(state): State<AppState>,
    Path((area, key)): Path<(String, String)>,
) -> Result<Json<bool>, ApiError> {
    let area = parse_area(&area)?;
    Ok(Json(state.bucket.exists(area, &key).await))
}

async fn delete_file(
    State(state): State<AppState>,
    Path((area, key)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let area = parse_area(&area)?;
    state.bucket.delete(area, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Minimal extension-based content-type table; unknown types fall back to
/// PDF, the dominant attachment format.
fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("pdf") => "application/pdf",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("txt") => "text/plain",
        Some("html") => "text/html",
        Some("epub") => "application/epub+zip",
        _ => "application/pdf",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_follow_the_extension() {
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(content_type_for("cover-thumb.jpg"), "image/jpeg");
        assert_eq!(content_type_for("weird.bin"), "application/pdf");
        assert_eq!(content_type_for("no-extension"), "application/pdf");
    }
}
