//! Document-understanding client.
//!
//! Sends a canonical document to a managed OCR service and returns the
//! analyzed document structure: full text, pages with paragraph and token
//! layout anchors, and any detected entities. Layout-oriented formats
//! (slides, spreadsheets, markup) are routed to a layout-aware processor,
//! everything else to the plain OCR processor.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::auth::GoogleTokenProvider;

/// Media types routed to the layout-aware processor.
const LAYOUT_TYPES: &[&str] = &[
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/html",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/csv",
];

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Document analysis request failed: {0}")]
    RequestFailed(String),

    #[error("Document analysis returned {status}: {body}")]
    ServiceError {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Response models
// ---------------------------------------------------------------------------
//
// Segment indices arrive as int64-encoded strings and are absent when zero,
// so both ends are optional strings parsed defensively downstream.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSegment {
    pub start_index: Option<String>,
    pub end_index: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnchor {
    #[serde(default)]
    pub text_segments: Vec<TextSegment>,
    /// Some responses inline the span text here instead of (or as well as)
    /// referencing it through segment offsets.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    #[serde(default)]
    pub text_anchor: TextAnchor,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    #[serde(default)]
    pub layout: Layout,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(default)]
    pub layout: Layout,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub mention_text: Option<String>,
}

/// Block tree returned by the layout-aware processor. Blocks nest: a
/// section block carries child blocks under its text block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLayout {
    #[serde(default)]
    pub blocks: Vec<LayoutBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutBlock {
    #[serde(default)]
    pub text_block: Option<TextBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub blocks: Vec<LayoutBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedDocument {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub document_layout: Option<DocumentLayout>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default)]
    pub document: AnalyzedDocument,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Analysis seam used by the ingestion coordinator.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        document: &Path,
        content_type: &str,
    ) -> Result<AnalysisResult, OcrError>;
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub project_id: String,
    pub location: String,
    pub processor_ocr: String,
    pub processor_layout: String,
}

impl ProcessorConfig {
    fn processor_for(&self, content_type: &str) -> &str {
        if LAYOUT_TYPES.contains(&content_type.to_lowercase().as_str()) {
            &self.processor_layout
        } else {
            &self.processor_ocr
        }
    }
}

pub struct DocumentAiClient {
    http: reqwest::Client,
    tokens: Arc<GoogleTokenProvider>,
    config: ProcessorConfig,
    base_url: String,
}

impl DocumentAiClient {
    pub fn new(
        tokens: Arc<GoogleTokenProvider>,
        config: ProcessorConfig,
    ) -> Result<Self, anyhow::Error> {
        let base_url = format!("https://{}-documentai.googleapis.com", config.location);
        Self::with_base_url(tokens, config, base_url)
    }

    /// Point the client at an alternate endpoint.
    pub fn with_base_url(
        tokens: Arc<GoogleTokenProvider>,
        config: ProcessorConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create analysis HTTP client: {}", e))?;
        Ok(Self {
            http,
            tokens,
            config,
            base_url: base_url.into(),
        })
    }

    fn process_url(&self, content_type: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/processors/{}:process",
            self.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.location,
            self.config.processor_for(content_type),
        )
    }
}

#[async_trait]
impl TextAnalyzer for DocumentAiClient {
    async fn analyze(
        &self,
        document: &Path,
        content_type: &str,
    ) -> Result<AnalysisResult, OcrError> {
        let bytes = tokio::fs::read(document).await?;
        if bytes.is_empty() {
            return Err(OcrError::RequestFailed(format!(
                "refusing to analyze empty file {}",
                document.display()
            )));
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| OcrError::Auth(e.to_string()))?;

        let url = self.process_url(content_type);
        tracing::info!(
            url = %url,
            content_type = content_type,
            size = bytes.len(),
            "Requesting document analysis"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({
                "rawDocument": {
                    "content": encoded,
                    "mimeType": content_type,
                },
            }))
            .send()
            .await
            .map_err(|e| OcrError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Document analysis failed");
            return Err(OcrError::ServiceError { status, body });
        }

        response
            .json::<AnalysisResult>()
            .await
            .map_err(|e| OcrError::RequestFailed(format!("invalid response: {}", e)))
    }
}
