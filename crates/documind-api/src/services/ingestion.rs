//! Ingestion pipeline coordinator.
//!
//! One upload, one run: validate, stage to a temporary file, convert to the
//! canonical format, archive the canonical file, analyze it, reconstruct the
//! text, persist the record. Every temporary file created during a run is
//! deleted before the run returns, on success and on failure; deletion is
//! idempotent and a missing file is not an error. The archived remote file
//! is never rolled back on a later failure: an orphaned archive entry is an
//! acceptable recoverable artifact, a second round of remote deletes is not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use documind_core::models::{
    NewDocument, ProcessedData, ProcessingMetadata, UploadResponse,
};
use documind_core::{AppError, Config, Stopwatch};
use documind_db::DocumentStore;
use documind_services::{
    extract_content, Archive, Converter, TextAnalyzer, CANONICAL_CONTENT_TYPE, CANONICAL_EXTENSION,
};
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::state::AppState;

/// One raw upload, owned by a single pipeline run.
#[derive(Debug)]
pub struct UploadedDocument {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Temporary files created during a run. Cleanup drains the list, so calling
/// it twice deletes nothing twice; a file that is already gone is skipped.
#[derive(Default)]
struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    async fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Deleted temporary file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    // Never mask the failure being reported with a cleanup error.
                    tracing::warn!(path = %path.display(), error = %err, "Failed to delete temporary file");
                }
            }
        }
    }
}

/// Unique staging name: sanitized original stem, millisecond timestamp,
/// eight random alphanumerics, original extension. Collision-safe while
/// keeping the original name recognizable in logs and the archive.
fn staging_filename(original: &str) -> String {
    let original = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let (stem, extension) = match original.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (original, None),
    };
    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let timestamp = chrono::Utc::now().timestamp_millis();
    match extension {
        Some(ext) => format!("{}-{}-{}.{}", stem, timestamp, suffix, ext.to_lowercase()),
        None => format!("{}-{}-{}", stem, timestamp, suffix),
    }
}

pub struct IngestionService {
    config: Config,
    converter: Arc<dyn Converter>,
    analyzer: Arc<dyn TextAnalyzer>,
    archive: Arc<dyn Archive>,
    documents: Arc<dyn DocumentStore>,
}

impl IngestionService {
    pub fn new(
        config: Config,
        converter: Arc<dyn Converter>,
        analyzer: Arc<dyn TextAnalyzer>,
        archive: Arc<dyn Archive>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            config,
            converter,
            analyzer,
            archive,
            documents,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.config.clone(),
            state.converter.clone(),
            state.analyzer.clone(),
            state.archive.clone(),
            state.documents.clone(),
        )
    }

    /// Guards checked before anything is written to disk, so a rejection
    /// here needs no cleanup.
    fn validate(&self, upload: &UploadedDocument) -> Result<(), AppError> {
        if upload.data.is_empty() {
            return Err(AppError::InvalidInput("Uploaded file is empty".to_string()));
        }
        if upload.data.len() > self.config.max_upload_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "File size {} bytes exceeds the {} byte limit",
                upload.data.len(),
                self.config.max_upload_size_bytes
            )));
        }
        let content_type = upload.content_type.to_lowercase();
        if self.config.strict_content_types
            && !self.config.allowed_content_types.contains(&content_type)
        {
            return Err(AppError::InvalidInput(format!(
                "Content type '{}' is not allowed",
                upload.content_type
            )));
        }
        Ok(())
    }

    pub async fn ingest(&self, upload: UploadedDocument) -> Result<UploadResponse, AppError> {
        let mut stopwatch = Stopwatch::start();
        self.validate(&upload)?;

        let mut temp = TempFiles::default();
        let result = self.run(&upload, &mut temp, &mut stopwatch).await;
        temp.cleanup().await;

        match &result {
            Ok(response) => tracing::info!(
                filename = %upload.filename,
                document_id = %response.document_id,
                elapsed = %stopwatch.formatted(),
                "Document ingested"
            ),
            Err(err) => tracing::error!(
                filename = %upload.filename,
                error_type = err.error_type(),
                elapsed = %stopwatch.formatted(),
                "Document ingestion failed"
            ),
        }
        result
    }

    async fn run(
        &self,
        upload: &UploadedDocument,
        temp: &mut TempFiles,
        stopwatch: &mut Stopwatch,
    ) -> Result<UploadResponse, AppError> {
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        tokio::fs::create_dir_all(&self.config.processed_dir).await?;

        // Stage the raw bytes.
        let staged_name = staging_filename(&upload.filename);
        let staged = Path::new(&self.config.upload_dir).join(&staged_name);
        tokio::fs::write(&staged, &upload.data).await?;
        temp.track(staged.clone());
        tracing::debug!(path = %staged.display(), size = upload.data.len(), "Upload staged");

        // Convert to the canonical format unless the upload already is it.
        let content_type = upload.content_type.to_lowercase();
        let (canonical, canonical_type, converter_label) =
            if content_type == CANONICAL_CONTENT_TYPE {
                (staged.clone(), CANONICAL_CONTENT_TYPE.to_string(), "fast-path".to_string())
            } else {
                let stem = staged_name
                    .rsplit_once('.')
                    .map(|(stem, _)| stem)
                    .unwrap_or(&staged_name);
                let output = Path::new(&self.config.processed_dir)
                    .join(format!("{}.{}", stem, CANONICAL_EXTENSION));
                temp.track(output.clone());
                let outcome = self
                    .converter
                    .convert(&staged, &output, &content_type)
                    .await
                    .map_err(|e| AppError::Conversion(e.to_string()))?;
                let canonical_type = if outcome.converter == "passthrough" {
                    content_type.clone()
                } else {
                    CANONICAL_CONTENT_TYPE.to_string()
                };
                (outcome.output, canonical_type, outcome.converter.to_string())
            };

        // Archive the canonical file remotely.
        let archive_name = canonical
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&staged_name)
            .to_string();
        let archive_file_id = self
            .archive
            .upload(&canonical, &archive_name)
            .await
            .map_err(|e| AppError::Archive(e.to_string()))?;

        // Analyze and reconstruct the text. Empty text is a degraded success.
        let analysis = self
            .analyzer
            .analyze(&canonical, &canonical_type)
            .await
            .map_err(|e| AppError::Extraction(e.to_string()))?;
        let extracted = extract_content(&analysis);
        if extracted.text.is_empty() {
            tracing::warn!(
                filename = %upload.filename,
                "Analysis returned no text; persisting an empty document"
            );
        }

        stopwatch.stop();
        let processing = ProcessingMetadata {
            processing_time_ms: stopwatch.elapsed_ms(),
            processing_time: stopwatch.formatted(),
            converter: converter_label,
            extraction_tier: extracted.tier,
            pages: extracted.pages,
            entities: extracted.entities,
            original_filename: upload.filename.clone(),
            original_size: upload.data.len() as i64,
            original_content_type: upload.content_type.clone(),
        };

        let content_length = extracted.text.len();
        let document = NewDocument {
            title: upload.filename.clone(),
            content: extracted.text,
            summary: String::new(),
            archive_folder: self.config.archive_folder_name.clone(),
            archive_file_id: archive_file_id.clone(),
            processing: processing.clone(),
        };
        let stored = self
            .documents
            .insert(document)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(UploadResponse {
            success: true,
            filename: upload.filename.clone(),
            file_size: upload.data.len() as i64,
            content_length,
            document_id: stored.id,
            archive_file_id,
            processed_data: ProcessedData {
                pages: processing.pages,
                entities: processing.entities,
                extraction_tier: processing.extraction_tier,
                processing_time: processing.processing_time,
                converter: processing.converter,
            },
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use documind_core::models::ExtractionTier;
    use documind_services::ocr::{AnalysisResult, AnalyzedDocument};
    use std::sync::atomic::Ordering;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            server_port: 0,
            environment: "test".to_string(),
            cors_origins: vec!["*".to_string()],
            database_url: "postgres://localhost/documind".to_string(),
            db_max_connections: 5,
            db_timeout_seconds: 5,
            upload_dir: dir.path().join("uploads").display().to_string(),
            processed_dir: dir.path().join("processed").display().to_string(),
            max_upload_size_bytes: 20 * 1024 * 1024,
            allowed_content_types: vec![
                "application/pdf".to_string(),
                "application/msword".to_string(),
                "image/png".to_string(),
            ],
            strict_content_types: true,
            convert_api_url: "http://localhost:0".to_string(),
            convert_api_secret: None,
            convert_timeout_seconds: 1,
            convert_max_attempts: 3,
            convert_backoff_seconds: 0,
            gcp_project_id: None,
            gcp_location: "us".to_string(),
            gcp_processor_ocr: None,
            gcp_processor_layout: None,
            archive_folder_name: "parsed".to_string(),
            service_key: None,
            service_email: None,
        }
    }

    struct Pipeline {
        service: IngestionService,
        converter: Arc<FakeConverter>,
        analyzer: Arc<FakeAnalyzer>,
        archive: Arc<FakeArchive>,
        store: Arc<FakeStore>,
        _dir: tempfile::TempDir,
    }

    impl Pipeline {
        fn temp_file_count(&self, config_dir: &str) -> usize {
            std::fs::read_dir(config_dir)
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    fn pipeline(
        converter: FakeConverter,
        analyzer: FakeAnalyzer,
        archive: FakeArchive,
        store: FakeStore,
    ) -> Pipeline {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(&dir);
        let converter = Arc::new(converter);
        let analyzer = Arc::new(analyzer);
        let archive = Arc::new(archive);
        let store = Arc::new(store);
        let service = IngestionService::new(
            config,
            converter.clone(),
            analyzer.clone(),
            archive.clone(),
            store.clone(),
        );
        Pipeline {
            service,
            converter,
            analyzer,
            archive,
            store,
            _dir: dir,
        }
    }

    fn pdf_upload() -> UploadedDocument {
        UploadedDocument {
            filename: "lecture notes.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: b"%PDF-1.4 fake".to_vec(),
        }
    }

    fn docx_upload() -> UploadedDocument {
        UploadedDocument {
            filename: "essay.docx".to_string(),
            content_type: "application/msword".to_string(),
            data: b"essay body".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_happy_path_canonical_upload() {
        let p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::with_text("Photosynthesis converts light into energy."),
            FakeArchive::ok(),
            FakeStore::ok(),
        );

        let response = p.service.ingest(pdf_upload()).await.expect("success");

        assert!(response.success);
        assert_eq!(response.filename, "lecture notes.pdf");
        assert_eq!(response.file_size, 13);
        assert_eq!(response.archive_file_id, "archive-file-1");
        assert_eq!(
            response.content_length,
            "Photosynthesis converts light into energy.".len()
        );
        assert_eq!(response.processed_data.converter, "fast-path");
        assert_eq!(
            response.processed_data.extraction_tier,
            ExtractionTier::Direct
        );
        // Canonical input never reaches the converter.
        assert_eq!(p.converter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            p.store.inserted.lock().unwrap()[0].content,
            "Photosynthesis converts light into energy."
        );
        // All temporary files are gone after a successful run.
        assert_eq!(
            p.temp_file_count(&p.service.config.upload_dir)
                + p.temp_file_count(&p.service.config.processed_dir),
            0
        );
    }

    #[tokio::test]
    async fn test_non_canonical_upload_is_converted() {
        let p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::with_text("essay body"),
            FakeArchive::ok(),
            FakeStore::ok(),
        );

        let response = p.service.ingest(docx_upload()).await.expect("success");

        assert_eq!(response.processed_data.converter, "remote");
        assert_eq!(p.converter.calls.load(Ordering::SeqCst), 1);
        // The archived file is the converted canonical output.
        let names = p.archive.uploaded_names.lock().unwrap();
        assert!(names[0].ends_with(".pdf"), "archived {:?}", names[0]);
        assert!(names[0].starts_with("essay-"));
    }

    #[tokio::test]
    async fn test_image_passthrough_keeps_original_content_type() {
        let p = pipeline(
            FakeConverter::passing_through(),
            FakeAnalyzer::with_text("scanned text"),
            FakeArchive::ok(),
            FakeStore::ok(),
        );
        let upload = UploadedDocument {
            filename: "scan.png".to_string(),
            content_type: "image/png".to_string(),
            data: b"png bytes".to_vec(),
        };

        let response = p.service.ingest(upload).await.expect("success");

        assert_eq!(response.processed_data.converter, "passthrough");
        // The unconverted image is analyzed under its own type, not the
        // canonical one.
        let seen = p.analyzer.seen_types.lock().unwrap();
        assert_eq!(seen.as_slice(), ["image/png"]);
        assert_eq!(p.archive.calls.load(Ordering::SeqCst), 1);
        let inserted = p.store.inserted.lock().unwrap();
        assert_eq!(inserted[0].processing.converter, "passthrough");
    }

    #[tokio::test]
    async fn test_paragraph_tier_recorded_in_persisted_metadata() {
        use documind_services::ocr::{Layout, Page, Paragraph, TextAnchor};

        let paragraph = |content: &str| Paragraph {
            layout: Layout {
                text_anchor: TextAnchor {
                    text_segments: vec![],
                    content: Some(content.to_string()),
                },
            },
        };
        let analysis = AnalysisResult {
            document: AnalyzedDocument {
                text: None,
                pages: vec![Page {
                    paragraphs: vec![paragraph("Slide one."), paragraph("Slide two.")],
                    tokens: vec![],
                }],
                ..Default::default()
            },
        };
        let p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::with_result(analysis),
            FakeArchive::ok(),
            FakeStore::ok(),
        );

        let response = p.service.ingest(docx_upload()).await.expect("success");

        assert_eq!(
            response.processed_data.extraction_tier,
            ExtractionTier::Paragraph
        );
        let inserted = p.store.inserted.lock().unwrap();
        assert_eq!(inserted[0].content, "Slide one.\nSlide two.");
        assert_eq!(
            inserted[0].processing.extraction_tier,
            ExtractionTier::Paragraph
        );
    }

    #[tokio::test]
    async fn test_conversion_failure_cleans_up_and_skips_archive() {
        let p = pipeline(
            FakeConverter::failing(),
            FakeAnalyzer::with_text("unused"),
            FakeArchive::ok(),
            FakeStore::ok(),
        );

        let err = p.service.ingest(docx_upload()).await.unwrap_err();

        assert!(matches!(err, AppError::Conversion(_)));
        assert_eq!(p.archive.calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.temp_file_count(&p.service.config.upload_dir), 0);
        assert_eq!(p.temp_file_count(&p.service.config.processed_dir), 0);
    }

    #[tokio::test]
    async fn test_archive_failure_fails_run_before_analysis() {
        let p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::with_text("unused"),
            FakeArchive::failing(),
            FakeStore::ok(),
        );

        let err = p.service.ingest(pdf_upload()).await.unwrap_err();

        assert!(matches!(err, AppError::Archive(_)));
        assert_eq!(p.analyzer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.temp_file_count(&p.service.config.upload_dir), 0);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_extraction_error() {
        let p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::failing(),
            FakeArchive::ok(),
            FakeStore::ok(),
        );

        let err = p.service.ingest(pdf_upload()).await.unwrap_err();

        assert!(matches!(err, AppError::Extraction(_)));
        // The file was archived before analysis failed; it stays archived.
        assert_eq!(p.archive.calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.temp_file_count(&p.service.config.upload_dir), 0);
    }

    #[tokio::test]
    async fn test_empty_extraction_persists_empty_document() {
        let p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::empty(),
            FakeArchive::ok(),
            FakeStore::ok(),
        );

        let response = p.service.ingest(pdf_upload()).await.expect("success");

        assert_eq!(response.content_length, 0);
        assert_eq!(response.processed_data.extraction_tier, ExtractionTier::None);
        let inserted = p.store.inserted.lock().unwrap();
        assert_eq!(inserted[0].content, "");
        assert_eq!(inserted[0].summary, "");
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_archive_entry() {
        let p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::with_text("text"),
            FakeArchive::ok(),
            FakeStore::failing(),
        );

        let err = p.service.ingest(pdf_upload()).await.unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        // No rollback of the remote file, and local temp files are gone.
        assert_eq!(p.archive.calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.temp_file_count(&p.service.config.upload_dir), 0);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_file_is_written() {
        let p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::with_text("unused"),
            FakeArchive::ok(),
            FakeStore::ok(),
        );

        let empty = UploadedDocument {
            filename: "empty.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: Vec::new(),
        };
        assert!(matches!(
            p.service.ingest(empty).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));

        let oversize = UploadedDocument {
            filename: "big.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            data: vec![0u8; 20 * 1024 * 1024 + 1],
        };
        assert!(matches!(
            p.service.ingest(oversize).await.unwrap_err(),
            AppError::PayloadTooLarge(_)
        ));

        let disallowed = UploadedDocument {
            filename: "movie.mp4".to_string(),
            content_type: "video/mp4".to_string(),
            data: b"frames".to_vec(),
        };
        assert!(matches!(
            p.service.ingest(disallowed).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));

        // Nothing was staged for any of the rejected uploads.
        assert!(!Path::new(&p.service.config.upload_dir).exists());
    }

    #[tokio::test]
    async fn test_lenient_mode_accepts_unlisted_content_type() {
        let mut p = pipeline(
            FakeConverter::ok(),
            FakeAnalyzer::with_text("plain text"),
            FakeArchive::ok(),
            FakeStore::ok(),
        );
        p.service.config.strict_content_types = false;

        let upload = UploadedDocument {
            filename: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            data: b"plain text".to_vec(),
        };
        let response = p.service.ingest(upload).await.expect("success");
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged.pdf");
        std::fs::write(&path, b"bytes").unwrap();

        let mut temp = TempFiles::default();
        temp.track(path.clone());
        temp.cleanup().await;
        assert!(!path.exists());
        // Second pass has nothing tracked and must not error.
        temp.cleanup().await;

        // Tracking a path that never existed is also fine.
        temp.track(dir.path().join("never-created.pdf"));
        temp.cleanup().await;
    }

    #[test]
    fn test_staging_filename_shape() {
        let name = staging_filename("My Essay (final).DOCX");
        assert!(name.ends_with(".docx"));
        assert!(name.starts_with("My_Essay__final_-"));
        let name2 = staging_filename("My Essay (final).DOCX");
        assert_ne!(name, name2);

        // Path components are stripped.
        let traversal = staging_filename("../../etc/passwd");
        assert!(!traversal.contains('/'));
        assert!(traversal.starts_with("passwd-"));
    }
}
