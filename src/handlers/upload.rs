// handlers/upload.rs
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use chrono::Duration;
use std::path::Path as StdPath;
use tokio_util::io::ReaderStream;
use tracing::info;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::user::Claims;
use crate::state::AppState;

/// Accepts a driver's-license image and parks it until a booking claims it.
/// Unclaimed files are reaped once their TTL passes.
pub async fn upload_license(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }

        let original = field
            .file_name()
            .map(|name| name.to_string())
            .unwrap_or_else(|| "license.jpg".to_string());
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(AppError::validation("uploaded image is empty"));
        }

        let file_name = format!(
            "{}_{}",
            Uuid::new_v4().simple(),
            sanitize_filename::sanitize(&original)
        );
        let path = StdPath::new(&state.config.upload_dir).join(&file_name);
        tokio::fs::write(&path, &data).await?;

        state.uploads.register(
            claims.sub,
            &file_name,
            Duration::minutes(state.config.upload_ttl_minutes),
        );
        info!("Stored license upload {} for customer {}", file_name, claims.sub);

        return Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({ "file_name": file_name })),
        ));
    }

    Err(AppError::validation("no image field in upload"))
}

pub async fn serve_license(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Response> {
    // Security: prevent path traversal
    if file_name.contains("..") || file_name.contains('/') || file_name.contains('\\') {
        return Err(AppError::not_found("image"));
    }

    let file_path = StdPath::new(&state.config.upload_dir).join(&file_name);
    if !file_path.is_file() {
        return Err(AppError::not_found("image"));
    }

    let file = tokio::fs::File::open(&file_path)
        .await
        .map_err(|_| AppError::not_found("image"))?;
    let stream = ReaderStream::new(file);

    let content_type = if file_name.ends_with(".png") {
        "image/png"
    } else if file_name.ends_with(".jpg") || file_name.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", content_type)
        .body(axum::body::Body::from_stream(stream))
        .map_err(|e| AppError::storage(e.to_string()))?;

    Ok(response)
}
