//! Error types module
//!
//! All pipeline failures are unified under the `AppError` enum. Each stage
//! client (converter, OCR, archive, store) has its own error enum in its own
//! crate; the ingestion coordinator converts those into `AppError` so the
//! HTTP layer reports a single consistent classification regardless of which
//! stage failed.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented.
/// This trait allows errors to self-describe their HTTP response characteristics.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "CONVERSION_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("Archive upload failed: {0}")]
    Archive(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, sensitive, log_level).
/// Reduces duplication in the ErrorMetadata impl; client_message stays per-variant.
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, bool, LogLevel) {
    match err {
        AppError::InvalidInput(_) => (400, "INVALID_INPUT", false, false, LogLevel::Debug),
        AppError::PayloadTooLarge(_) => (400, "PAYLOAD_TOO_LARGE", false, false, LogLevel::Debug),
        AppError::Conversion(_) => (500, "CONVERSION_ERROR", true, false, LogLevel::Error),
        AppError::Archive(_) => (500, "ARCHIVE_ERROR", true, true, LogLevel::Error),
        AppError::Extraction(_) => (500, "EXTRACTION_ERROR", false, true, LogLevel::Error),
        AppError::Database(_) => (500, "DATABASE_ERROR", true, true, LogLevel::Error),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            (500, "INTERNAL_ERROR", false, true, LogLevel::Error)
        }
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn client_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) | AppError::PayloadTooLarge(msg) => msg.clone(),
            AppError::Conversion(_) => "Document conversion failed".to_string(),
            AppError::Archive(_) => "Failed to archive document".to_string(),
            AppError::Extraction(_) => "Failed to extract text from document".to_string(),
            AppError::Database(_) => "Failed to save document".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).4
    }
}

impl AppError {
    /// Full internal message, including the source chain when present.
    pub fn detailed_message(&self) -> String {
        match self {
            AppError::InternalWithSource { message, source } => {
                format!("{}: {:#}", message, source)
            }
            other => other.to_string(),
        }
    }

    /// Variant name for structured logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::Conversion(_) => "Conversion",
            AppError::Archive(_) => "Archive",
            AppError::Extraction(_) => "Extraction",
            AppError::Database(_) => "Database",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "InternalWithSource",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_client_errors() {
        let err = AppError::InvalidInput("bad type".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert_eq!(err.log_level(), LogLevel::Debug);
        assert!(!err.is_sensitive());

        let err = AppError::PayloadTooLarge("25 MB".to_string());
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_pipeline_stage_errors_are_server_errors() {
        for err in [
            AppError::Conversion("convert api down".to_string()),
            AppError::Archive("quota".to_string()),
            AppError::Extraction("processor missing".to_string()),
            AppError::Database("insert failed".to_string()),
        ] {
            assert_eq!(err.http_status_code(), 500, "{:?}", err);
            assert_eq!(err.log_level(), LogLevel::Error);
        }
    }

    #[test]
    fn test_client_message_hides_stage_detail() {
        let err = AppError::Archive("auth token rejected by googleapis".to_string());
        assert!(!err.client_message().contains("googleapis"));
        assert!(err.detailed_message().contains("googleapis"));
    }

    #[test]
    fn test_internal_with_source_chains_detail() {
        let source = anyhow::anyhow!("root cause").context("wrapping context");
        let err = AppError::InternalWithSource {
            message: "unexpected".to_string(),
            source,
        };
        let detail = err.detailed_message();
        assert!(detail.contains("unexpected"));
        assert!(detail.contains("root cause"));
    }
}
