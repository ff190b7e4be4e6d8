//! Core types shared across the documind crates: configuration, the unified
//! error type, service credentials, domain models, and small utilities used
//! by the ingestion pipeline.

pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod retry;
pub mod stopwatch;

pub use config::Config;
pub use credentials::{ResolvedCredentials, ServiceCredentials};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use retry::RetryPolicy;
pub use stopwatch::Stopwatch;
