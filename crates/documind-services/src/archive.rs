//! Archive upload to durable cloud storage.
//!
//! Files land inside a single well-known top-level folder, looked up by
//! exact name and created when absent. Two concurrent uploads racing the
//! folder creation may produce duplicate folders; the remote service allows
//! that and this client does not deduplicate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::auth::GoogleTokenProvider;
use crate::mime::content_type_for_extension;

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive request failed: {0}")]
    RequestFailed(String),

    #[error("Archive service returned {status}: {body}")]
    ServiceError {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Archive seam used by the ingestion coordinator. Returns the remote file
/// identifier needed for later retrieval.
#[async_trait]
pub trait Archive: Send + Sync {
    async fn upload(&self, local: &Path, desired_name: &str) -> Result<String, ArchiveError>;
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    id: String,
}

pub struct DriveArchive {
    http: reqwest::Client,
    tokens: Arc<GoogleTokenProvider>,
    folder_name: String,
    files_url: String,
    upload_url: String,
}

impl DriveArchive {
    pub fn new(
        tokens: Arc<GoogleTokenProvider>,
        folder_name: impl Into<String>,
    ) -> Result<Self, anyhow::Error> {
        Self::with_base_urls(
            tokens,
            folder_name,
            "https://www.googleapis.com/drive/v3/files",
            "https://www.googleapis.com/upload/drive/v3/files",
        )
    }

    /// Point the client at alternate endpoints.
    pub fn with_base_urls(
        tokens: Arc<GoogleTokenProvider>,
        folder_name: impl Into<String>,
        files_url: impl Into<String>,
        upload_url: impl Into<String>,
    ) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create archive HTTP client: {}", e))?;
        Ok(Self {
            http,
            tokens,
            folder_name: folder_name.into(),
            files_url: files_url.into(),
            upload_url: upload_url.into(),
        })
    }

    async fn token(&self) -> Result<String, ArchiveError> {
        self.tokens
            .token()
            .await
            .map_err(|e| ArchiveError::Auth(e.to_string()))
    }

    /// Exact-match lookup on folder type, name and not-trashed; creates the
    /// folder when the query comes back empty.
    async fn ensure_folder(&self, token: &str) -> Result<String, ArchiveError> {
        let query = format!(
            "mimeType='{}' and name='{}' and trashed=false",
            FOLDER_MIME_TYPE,
            self.folder_name.replace('\'', "\\'")
        );
        let response = self
            .http
            .get(&self.files_url)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await
            .map_err(|e| ArchiveError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchiveError::ServiceError { status, body });
        }

        let list: FileList = response
            .json()
            .await
            .map_err(|e| ArchiveError::RequestFailed(format!("invalid folder list: {}", e)))?;
        if let Some(folder) = list.files.first() {
            return Ok(folder.id.clone());
        }

        tracing::info!(folder = %self.folder_name, "Archive folder missing, creating it");
        let response = self
            .http
            .post(&self.files_url)
            .bearer_auth(token)
            .json(&json!({
                "name": self.folder_name,
                "mimeType": FOLDER_MIME_TYPE,
            }))
            .send()
            .await
            .map_err(|e| ArchiveError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ArchiveError::ServiceError { status, body });
        }
        let created: RemoteFile = response
            .json()
            .await
            .map_err(|e| ArchiveError::RequestFailed(format!("invalid create response: {}", e)))?;
        Ok(created.id)
    }
}

#[async_trait]
impl Archive for DriveArchive {
    async fn upload(&self, local: &Path, desired_name: &str) -> Result<String, ArchiveError> {
        let token = self.token().await?;
        let folder_id = self.ensure_folder(&token).await?;

        let extension = local
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let content_type = content_type_for_extension(extension);
        let bytes = tokio::fs::read(local).await?;

        tracing::info!(
            name = desired_name,
            folder = %self.folder_name,
            size = bytes.len(),
            content_type = content_type,
            "Uploading to archive"
        );

        let metadata = json!({
            "name": desired_name,
            "parents": [folder_id],
        });
        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(|e| ArchiveError::RequestFailed(e.to_string()))?,
            )
            .part(
                "media",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(desired_name.to_string())
                    .mime_str(content_type)
                    .map_err(|e| ArchiveError::RequestFailed(e.to_string()))?,
            );

        let response = self
            .http
            .post(&self.upload_url)
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| ArchiveError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Archive upload failed");
            return Err(ArchiveError::ServiceError { status, body });
        }

        let uploaded: RemoteFile = response
            .json()
            .await
            .map_err(|e| ArchiveError::RequestFailed(format!("invalid upload response: {}", e)))?;
        tracing::info!(file_id = %uploaded.id, "Archive upload complete");
        Ok(uploaded.id)
    }
}
