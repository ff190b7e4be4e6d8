//! Configuration module
//!
//! Env-driven configuration for the API and the external-service clients:
//! upload limits, temp/processed directories, the conversion service, the
//! document-understanding (OCR) service, the archive, and the database.

use std::env;
use std::time::Duration;

use crate::credentials::{ResolvedCredentials, ServiceCredentials};

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_UPLOAD_SIZE_MB: usize = 20;
const CONVERT_TIMEOUT_SECS: u64 = 180;
const CONVERT_MAX_ATTEMPTS: u32 = 3;
const CONVERT_BACKOFF_SECS: u64 = 2;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,

    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,

    pub upload_dir: String,
    pub processed_dir: String,
    pub max_upload_size_bytes: usize,
    pub allowed_content_types: Vec<String>,
    /// When false, the content-type allow-list is not enforced.
    pub strict_content_types: bool,

    // Conversion service
    pub convert_api_url: String,
    pub convert_api_secret: Option<String>,
    pub convert_timeout_seconds: u64,
    pub convert_max_attempts: u32,
    pub convert_backoff_seconds: u64,

    // Document-understanding service
    pub gcp_project_id: Option<String>,
    pub gcp_location: String,
    pub gcp_processor_ocr: Option<String>,
    pub gcp_processor_layout: Option<String>,

    // Archive
    pub archive_folder_name: String,

    // Raw service-account material, resolved once via `resolve_credentials`.
    pub service_key: Option<String>,
    pub service_email: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let max_upload_size_mb = env::var("MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_UPLOAD_SIZE_MB);

        let allowed_content_types = env::var("ALLOWED_CONTENT_TYPES")
            .unwrap_or_else(|_| {
                [
                    "application/pdf",
                    "application/vnd.ms-powerpoint",
                    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                    "application/msword",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    "image/jpeg",
                    "image/png",
                    "image/tiff",
                    "text/plain",
                ]
                .join(",")
            })
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .collect();

        Ok(Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            cors_origins,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            processed_dir: env::var("PROCESSED_DIR").unwrap_or_else(|_| "processed".to_string()),
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
            allowed_content_types,
            strict_content_types: env::var("STRICT_CONTENT_TYPES")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
            convert_api_url: env::var("CONVERT_API_URL")
                .unwrap_or_else(|_| "https://v2.convertapi.com".to_string()),
            convert_api_secret: env::var("CONVERT_API_SECRET").ok(),
            convert_timeout_seconds: env::var("CONVERT_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONVERT_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONVERT_TIMEOUT_SECS),
            convert_max_attempts: env::var("CONVERT_MAX_ATTEMPTS")
                .unwrap_or_else(|_| CONVERT_MAX_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(CONVERT_MAX_ATTEMPTS),
            convert_backoff_seconds: env::var("CONVERT_BACKOFF_SECONDS")
                .unwrap_or_else(|_| CONVERT_BACKOFF_SECS.to_string())
                .parse()
                .unwrap_or(CONVERT_BACKOFF_SECS),
            gcp_project_id: env::var("GCP_PROJECT_ID").ok(),
            gcp_location: env::var("GCP_LOCATION").unwrap_or_else(|_| "us".to_string()),
            gcp_processor_ocr: env::var("GCP_PROCESSOR_OCR").ok(),
            gcp_processor_layout: env::var("GCP_PROCESSOR_LAYOUT").ok(),
            archive_folder_name: env::var("ARCHIVE_FOLDER_NAME")
                .unwrap_or_else(|_| "parsed".to_string()),
            service_key: env::var("SERVICE_KEY").ok(),
            service_email: env::var("SERVICE_EMAIL").ok(),
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_seconds)
    }

    pub fn convert_backoff(&self) -> Duration {
        Duration::from_secs(self.convert_backoff_seconds)
    }

    /// Detect and resolve the configured service-account credentials.
    pub fn resolve_credentials(&self) -> Result<ResolvedCredentials, anyhow::Error> {
        let key = self
            .service_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SERVICE_KEY environment variable is not set"))?;
        ServiceCredentials::detect(key, self.service_email.as_deref())?
            .resolve(self.gcp_project_id.clone())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() && self.cors_origins.iter().any(|o| o.trim() == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        if self.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be greater than 0"));
        }
        if self.gcp_project_id.is_none() || self.gcp_processor_ocr.is_none() {
            tracing::warn!(
                "GCP_PROJECT_ID / GCP_PROCESSOR_OCR not set; OCR extraction will fail at runtime"
            );
        }
        Ok(())
    }
}
