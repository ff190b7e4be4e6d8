//! Construction of the pipeline's external-service clients.

use std::sync::Arc;

use anyhow::{Context, Result};
use documind_core::{Config, RetryPolicy};
use documind_db::PgDocumentStore;
use documind_services::convert::HttpConvertBackend;
use documind_services::ocr::ProcessorConfig;
use documind_services::{DocumentAiClient, DriveArchive, GoogleTokenProvider, PdfConverter};
use sqlx::PgPool;

use crate::state::AppState;

const OCR_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const ARCHIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

pub fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    let credentials = config
        .resolve_credentials()
        .context("Failed to resolve service credentials")?;

    // A processor reference needs all three of project, location and id.
    let processors = ProcessorConfig {
        project_id: config
            .gcp_project_id
            .clone()
            .context("GCP_PROJECT_ID must be set")?,
        location: config.gcp_location.clone(),
        processor_ocr: config
            .gcp_processor_ocr
            .clone()
            .context("GCP_PROCESSOR_OCR must be set")?,
        processor_layout: config
            .gcp_processor_layout
            .clone()
            .or_else(|| config.gcp_processor_ocr.clone())
            .context("GCP_PROCESSOR_OCR must be set")?,
    };

    let backend = HttpConvertBackend::new(
        config.convert_api_url.clone(),
        config.convert_api_secret.clone(),
        config.convert_timeout(),
    )
    .context("Failed to create conversion client")?;
    let converter = PdfConverter::new(
        Arc::new(backend),
        RetryPolicy::new(config.convert_max_attempts, config.convert_backoff()),
    );

    let ocr_tokens = Arc::new(GoogleTokenProvider::new(credentials.clone(), OCR_SCOPE)?);
    let analyzer = DocumentAiClient::new(ocr_tokens, processors)
        .context("Failed to create document analysis client")?;

    let archive_tokens = Arc::new(GoogleTokenProvider::new(credentials, ARCHIVE_SCOPE)?);
    let archive = DriveArchive::new(archive_tokens, config.archive_folder_name.clone())
        .context("Failed to create archive client")?;

    let documents = PgDocumentStore::new(pool.clone());

    tracing::info!(
        archive_folder = %config.archive_folder_name,
        convert_url = %config.convert_api_url,
        "Pipeline services initialized"
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        pool: Some(pool),
        converter: Arc::new(converter),
        analyzer: Arc::new(analyzer),
        archive: Arc::new(archive),
        documents: Arc::new(documents),
    }))
}
