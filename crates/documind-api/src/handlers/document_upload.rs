use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use documind_core::models::UploadResponse;
use documind_core::AppError;

use crate::error::{ErrorResponse, HttpAppError};
use crate::services::ingestion::{IngestionService, UploadedDocument};
use crate::state::AppState;

/// Pull the first file part out of the multipart body. Accepts the
/// conventional "file" field name but falls back to any part that carries a
/// filename, so simple clients don't have to get the field name right.
async fn read_upload(mut multipart: Multipart) -> Result<UploadedDocument, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        let is_file_field = field.name() == Some("file") || field.file_name().is_some();
        if !is_file_field {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("File part has no filename".to_string()))?;
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {}", e)))?;
        return Ok(UploadedDocument {
            filename,
            content_type,
            data: data.to_vec(),
        });
    }
    Err(AppError::InvalidInput(
        "No file found in the request".to_string(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v0/documents",
    tag = "documents",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document ingested successfully", body = UploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 500, description = "Pipeline stage failed", body = ErrorResponse)
    )
)]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), HttpAppError> {
    let upload = read_upload(multipart).await.map_err(HttpAppError::from)?;
    tracing::info!(
        filename = %upload.filename,
        content_type = %upload.content_type,
        size = upload.data.len(),
        "Received document upload"
    );

    let service = IngestionService::from_state(&state);
    let response = service.ingest(upload).await.map_err(HttpAppError::from)?;
    Ok((StatusCode::CREATED, Json(response)))
}
