//! Format conversion to the canonical (PDF) representation.
//!
//! Inputs already in the canonical format are copied verbatim without
//! touching the remote service. Everything else goes through the remote
//! conversion call with retry; when every attempt fails and the OCR service
//! can consume the original type directly, the original file is passed
//! through unconverted - conversion is an optimization for those types, not
//! a hard requirement.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use documind_core::RetryPolicy;
use serde::Deserialize;

pub const CANONICAL_EXTENSION: &str = "pdf";
pub const CANONICAL_CONTENT_TYPE: &str = "application/pdf";

/// Media types the document-understanding service accepts without prior
/// conversion.
const OCR_CONSUMABLE_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/bmp",
    "image/tiff",
    "image/gif",
];

/// Presentation formats get a higher output resolution on conversion.
const PRESENTATION_TYPES: &[&str] = &[
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
];

pub fn is_ocr_consumable(content_type: &str) -> bool {
    OCR_CONSUMABLE_TYPES.contains(&content_type.to_lowercase().as_str())
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Remote conversion failed: {0}")]
    RemoteFailed(String),

    #[error("Converted output missing or empty: {0}")]
    EmptyOutput(String),

    #[error("Conversion exhausted retries for non-consumable type {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a run's canonical file was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    pub output: PathBuf,
    /// "fast-path", "remote", or "passthrough".
    pub converter: &'static str,
}

/// Conversion seam used by the ingestion coordinator.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        content_type: &str,
    ) -> Result<ConversionOutcome, ConvertError>;
}

/// The remote call only; retry, verification and fallback live in
/// `PdfConverter` so they can be tested without HTTP.
#[async_trait]
pub trait ConvertBackend: Send + Sync {
    async fn convert_remote(
        &self,
        input: &Path,
        output: &Path,
        content_type: &str,
    ) -> Result<(), ConvertError>;
}

pub struct PdfConverter {
    backend: Arc<dyn ConvertBackend>,
    retry: RetryPolicy,
}

impl PdfConverter {
    pub fn new(backend: Arc<dyn ConvertBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    async fn verify_output(output: &Path) -> Result<(), ConvertError> {
        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(ConvertError::EmptyOutput(output.display().to_string())),
            Err(_) => Err(ConvertError::EmptyOutput(output.display().to_string())),
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[async_trait]
impl Converter for PdfConverter {
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        content_type: &str,
    ) -> Result<ConversionOutcome, ConvertError> {
        // Fast path: already canonical, copy bytes verbatim.
        if extension_of(input) == CANONICAL_EXTENSION {
            tokio::fs::copy(input, output).await?;
            tracing::debug!(input = %input.display(), "Canonical input, skipping conversion");
            return Ok(ConversionOutcome {
                output: output.to_path_buf(),
                converter: "fast-path",
            });
        }

        let result = self
            .retry
            .run(|attempt| async move {
                tracing::info!(
                    attempt = attempt,
                    input = %input.display(),
                    content_type = content_type,
                    "Converting document"
                );
                self.backend.convert_remote(input, output, content_type).await?;
                // A nominally successful call with a missing or empty local
                // output counts as a failed attempt.
                Self::verify_output(output).await
            })
            .await;

        match result {
            Ok(()) => Ok(ConversionOutcome {
                output: output.to_path_buf(),
                converter: "remote",
            }),
            Err(err) if is_ocr_consumable(content_type) => {
                tracing::warn!(
                    error = %err,
                    content_type = content_type,
                    "Conversion exhausted retries; passing original through unconverted"
                );
                tokio::fs::copy(input, output).await?;
                Ok(ConversionOutcome {
                    output: output.to_path_buf(),
                    converter: "passthrough",
                })
            }
            Err(ConvertError::Io(err)) => Err(ConvertError::Io(err)),
            Err(err) => {
                tracing::error!(error = %err, "Conversion failed with no fallback");
                Err(ConvertError::Unsupported(content_type.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertResponse {
    files: Vec<ConvertedFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConvertedFile {
    url: String,
    #[allow(dead_code)]
    file_size: Option<u64>,
}

/// Remote conversion service client (pre-shared secret auth, result stored
/// remotely and downloaded here).
pub struct HttpConvertBackend {
    http: reqwest::Client,
    base_url: String,
    secret: Option<String>,
}

impl HttpConvertBackend {
    pub fn new(
        base_url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create conversion HTTP client: {}", e))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            secret,
        })
    }

    async fn download_to(&self, url: &str, output: &Path) -> Result<(), ConvertError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ConvertError::RemoteFailed(format!("result download: {}", e)))?;
        if !response.status().is_success() {
            return Err(ConvertError::RemoteFailed(format!(
                "result download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ConvertError::RemoteFailed(format!("result download: {}", e)))?;
        tokio::fs::write(output, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ConvertBackend for HttpConvertBackend {
    async fn convert_remote(
        &self,
        input: &Path,
        output: &Path,
        content_type: &str,
    ) -> Result<(), ConvertError> {
        let from = extension_of(input);
        let filename = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        let data = tokio::fs::read(input).await?;

        let mut url = format!(
            "{}/convert/{}/to/{}?StoreFile=true",
            self.base_url.trim_end_matches('/'),
            from,
            CANONICAL_EXTENSION
        );
        if let Some(secret) = &self.secret {
            url.push_str(&format!("&Secret={}", secret));
        }
        if PRESENTATION_TYPES.contains(&content_type) {
            url.push_str("&ImageResolution=300");
        }

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(filename)
            .mime_str(content_type)
            .map_err(|e| ConvertError::RemoteFailed(format!("invalid content type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("File", part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ConvertError::RemoteFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConvertError::RemoteFailed(format!("{}: {}", status, body)));
        }

        let converted: ConvertResponse = response
            .json()
            .await
            .map_err(|e| ConvertError::RemoteFailed(format!("invalid response: {}", e)))?;
        let file = converted
            .files
            .first()
            .ok_or_else(|| ConvertError::RemoteFailed("no result files".to_string()))?;

        self.download_to(&file.url, output).await?;

        // The stored remote artifact is no longer needed once downloaded.
        if let Err(err) = self.http.delete(&file.url).send().await {
            tracing::debug!(error = %err, url = %file.url, "Failed to delete remote conversion artifact");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingBackend {
        calls: AtomicU32,
        /// Bytes written to the output path per call; `None` simulates a
        /// call that claims success but writes nothing.
        writes: Option<Vec<u8>>,
        fail: bool,
    }

    #[async_trait]
    impl ConvertBackend for CountingBackend {
        async fn convert_remote(
            &self,
            _input: &Path,
            output: &Path,
            _content_type: &str,
        ) -> Result<(), ConvertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConvertError::RemoteFailed("simulated outage".to_string()));
            }
            if let Some(bytes) = &self.writes {
                tokio::fs::write(output, bytes).await?;
            }
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    fn converter(backend: CountingBackend) -> (PdfConverter, Arc<CountingBackend>) {
        let backend = Arc::new(backend);
        (
            PdfConverter::new(backend.clone(), fast_retry()),
            backend,
        )
    }

    fn temp_input(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).expect("write input");
        path
    }

    #[tokio::test]
    async fn test_canonical_input_copies_without_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let input = temp_input(&dir, "notes.pdf", b"%PDF-1.4 fake");
        let output = dir.path().join("notes-out.pdf");
        let (converter, backend) = converter(CountingBackend {
            calls: AtomicU32::new(0),
            writes: None,
            fail: true,
        });

        let outcome = converter
            .convert(&input, &output, CANONICAL_CONTENT_TYPE)
            .await
            .expect("fast path");

        assert_eq!(outcome.converter, "fast-path");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            std::fs::read(&output).unwrap(),
            std::fs::read(&input).unwrap()
        );
    }

    #[tokio::test]
    async fn test_failing_backend_attempted_exactly_three_times() {
        let dir = tempfile::tempdir().unwrap();
        let input = temp_input(&dir, "deck.pptx", b"deck");
        let output = dir.path().join("deck.pdf");
        let (converter, backend) = converter(CountingBackend {
            calls: AtomicU32::new(0),
            writes: None,
            fail: true,
        });

        let err = converter
            .convert(
                &input,
                &output,
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::Unsupported(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_output_counts_as_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let input = temp_input(&dir, "sheet.xlsx", b"cells");
        let output = dir.path().join("sheet.pdf");
        // Backend "succeeds" but never writes the output file.
        let (converter, backend) = converter(CountingBackend {
            calls: AtomicU32::new(0),
            writes: None,
            fail: false,
        });

        let err = converter
            .convert(&input, &output, "application/vnd.ms-excel")
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::Unsupported(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_image_type_falls_back_to_passthrough_after_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let input = temp_input(&dir, "scan.png", b"png bytes");
        let output = dir.path().join("scan.pdf");
        let (converter, backend) = converter(CountingBackend {
            calls: AtomicU32::new(0),
            writes: None,
            fail: true,
        });

        let outcome = converter
            .convert(&input, &output, "image/png")
            .await
            .expect("passthrough fallback");

        assert_eq!(outcome.converter, "passthrough");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read(&output).unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn test_successful_remote_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let input = temp_input(&dir, "memo.docx", b"memo");
        let output = dir.path().join("memo.pdf");
        let (converter, backend) = converter(CountingBackend {
            calls: AtomicU32::new(0),
            writes: Some(b"%PDF converted".to_vec()),
            fail: false,
        });

        let outcome = converter
            .convert(&input, &output, "application/msword")
            .await
            .expect("remote conversion");

        assert_eq!(outcome.converter, "remote");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&output).unwrap(), b"%PDF converted");
    }

    #[test]
    fn test_ocr_consumable_types() {
        assert!(is_ocr_consumable("image/png"));
        assert!(is_ocr_consumable("Image/TIFF"));
        assert!(is_ocr_consumable("application/pdf"));
        assert!(!is_ocr_consumable("application/msword"));
    }
}
