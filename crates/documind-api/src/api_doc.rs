//! OpenAPI documentation.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use documind_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Documind API",
        version = "0.1.0",
        description = "Document ingestion API: uploads are converted to PDF, archived to cloud storage, run through OCR, and persisted as searchable text records. Endpoints are versioned under /api/v0/."
    ),
    paths(handlers::document_upload::upload_document),
    components(schemas(
        models::UploadResponse,
        models::ProcessedData,
        models::ProcessingMetadata,
        models::ExtractionTier,
        error::ErrorResponse,
    )),
    tags(
        (name = "documents", description = "Document ingestion")
    )
)]
pub struct ApiDoc;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
