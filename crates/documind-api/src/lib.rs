//! Documind API Library
//!
//! HTTP surface and application setup for the document ingestion pipeline.

// Module declarations
mod api_doc;
mod handlers;
mod telemetry;

// Public modules
pub mod error;
pub mod services;
pub mod setup;
pub mod state;

// Re-exports
pub use error::ErrorResponse;
pub use services::ingestion::IngestionService;
