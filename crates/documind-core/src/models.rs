//! Domain models for the ingestion pipeline and its HTTP responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Which fallback level recovered the text from the OCR result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionTier {
    /// The service returned a populated flat text field.
    Direct,
    /// Text blocks from the layout-analysis structure.
    Layout,
    /// Paragraph text-anchor offsets resolved against the text buffer.
    Paragraph,
    /// Token offsets resolved against the text buffer.
    Token,
    /// Nothing resolved; empty text (degraded but valid).
    None,
}

impl ExtractionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionTier::Direct => "direct",
            ExtractionTier::Layout => "layout",
            ExtractionTier::Paragraph => "paragraph",
            ExtractionTier::Token => "token",
            ExtractionTier::None => "none",
        }
    }
}

impl std::fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat text plus extraction metadata, produced by the text reconstructor.
/// Empty text is a valid degraded outcome, never an error by itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub text: String,
    pub pages: usize,
    pub entities: usize,
    pub tier: ExtractionTier,
}

/// Processing metadata persisted alongside the document record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessingMetadata {
    pub processing_time_ms: u64,
    /// Human-readable form, e.g. "0m 12.34s".
    pub processing_time: String,
    /// Which conversion path produced the canonical file:
    /// "fast-path", "remote", or "passthrough".
    pub converter: String,
    pub extraction_tier: ExtractionTier,
    pub pages: usize,
    pub entities: usize,
    pub original_filename: String,
    pub original_size: i64,
    pub original_content_type: String,
}

/// A document ready to be written to the store. Created once per successful
/// pipeline run; never mutated by the pipeline afterwards.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    pub summary: String,
    pub archive_folder: String,
    pub archive_file_id: String,
    pub processing: ProcessingMetadata,
}

/// The durable record as returned by the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub summary: String,
    pub archive_folder: String,
    pub archive_file_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processing: ProcessingMetadata,
}

/// Extraction summary included in the upload response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedData {
    pub pages: usize,
    pub entities: usize,
    pub extraction_tier: ExtractionTier,
    pub processing_time: String,
    pub converter: String,
}

/// Success payload for the upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub file_size: i64,
    pub content_length: usize,
    pub document_id: Uuid,
    pub archive_file_id: String,
    pub processed_data: ProcessedData,
}

/// Lowercase the title and collapse runs of non-alphanumerics into single
/// hyphens. Uniqueness (random suffix on collision) is the store's job.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true;
    for ch in title.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("My Lecture Notes (v2).pdf"), "my-lecture-notes-v2-pdf");
        assert_eq!(slugify("  --hello--  "), "hello");
        assert_eq!(slugify("Édition 2024"), "dition-2024");
    }

    #[test]
    fn test_slugify_empty_and_symbol_only() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!??"), "");
    }

    #[test]
    fn test_extraction_tier_serializes_lowercase() {
        let json = serde_json::to_string(&ExtractionTier::Paragraph).unwrap();
        assert_eq!(json, "\"paragraph\"");
        assert_eq!(ExtractionTier::Layout.as_str(), "layout");
    }

    #[test]
    fn test_upload_response_uses_camel_case() {
        let response = UploadResponse {
            success: true,
            filename: "notes.pdf".to_string(),
            file_size: 2048,
            content_length: 11,
            document_id: Uuid::nil(),
            archive_file_id: "drive-1".to_string(),
            processed_data: ProcessedData {
                pages: 1,
                entities: 0,
                extraction_tier: ExtractionTier::Direct,
                processing_time: "0m 0.42s".to_string(),
                converter: "fast-path".to_string(),
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["fileSize"], 2048);
        assert_eq!(json["contentLength"], 11);
        assert!(json["archiveFileId"].is_string());
        assert_eq!(json["processedData"]["extractionTier"], "direct");
        assert_eq!(json["processedData"]["processingTime"], "0m 0.42s");
    }
}
