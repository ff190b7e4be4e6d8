//! External-service clients for the ingestion pipeline: format conversion,
//! document-understanding (OCR), archive upload, and the shared Google
//! OAuth token provider, plus the pure text reconstructor.
//!
//! Each client exposes a trait at the seam (`Converter`, `TextAnalyzer`,
//! `Archive`) so the coordinator can be exercised against in-memory fakes.

pub mod archive;
pub mod auth;
pub mod convert;
pub mod extract;
pub mod mime;
pub mod ocr;

pub use archive::{Archive, ArchiveError, DriveArchive};
pub use auth::GoogleTokenProvider;
pub use convert::{
    ConversionOutcome, ConvertBackend, ConvertError, Converter, HttpConvertBackend, PdfConverter,
    CANONICAL_CONTENT_TYPE, CANONICAL_EXTENSION,
};
pub use extract::extract_content;
pub use ocr::{AnalysisResult, DocumentAiClient, OcrError, ProcessorConfig, TextAnalyzer};
