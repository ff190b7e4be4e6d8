use async_trait::async_trait;
use chrono::{DateTime, Utc};
use documind_core::models::{slugify, NewDocument, ProcessingMetadata, StoredDocument};
use rand::Rng;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Document store operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Insert failed: {0}")]
    InsertFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// The single write the pipeline performs: insert one document record.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: NewDocument) -> Result<StoredDocument, StoreError>;
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    title: String,
    slug: String,
    content: String,
    summary: String,
    archive_folder: String,
    archive_file_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processing: serde_json::Value,
}

impl DocumentRow {
    fn into_document(self) -> Result<StoredDocument, StoreError> {
        let processing: ProcessingMetadata = serde_json::from_value(self.processing)
            .map_err(|e| StoreError::InvalidRecord(format!("processing metadata: {}", e)))?;
        Ok(StoredDocument {
            id: self.id,
            title: self.title,
            slug: self.slug,
            content: self.content,
            summary: self.summary,
            archive_folder: self.archive_folder,
            archive_file_id: self.archive_file_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            processing,
        })
    }
}

/// Postgres-backed document store.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Slugs are unique; on collision the trailing numeric suffix (if any)
    /// is replaced by a fresh random one and the lookup retried.
    async fn unique_slug(&self, title: &str) -> Result<String, StoreError> {
        let base = slugify(title);
        let mut candidate = if base.is_empty() {
            "document".to_string()
        } else {
            base
        };

        loop {
            let exists: Option<(Uuid,)> =
                sqlx::query_as::<Postgres, (Uuid,)>("SELECT id FROM documents WHERE slug = $1")
                    .bind(&candidate)
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_none() {
                return Ok(candidate);
            }
            let stem = match candidate.rfind('-') {
                Some(idx) if candidate[idx + 1..].chars().all(|c| c.is_ascii_digit()) => {
                    candidate[..idx].to_string()
                }
                _ => candidate.clone(),
            };
            let suffix: u32 = rand::rng().random_range(0..1000);
            candidate = format!("{}-{}", stem, suffix);
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, document: NewDocument) -> Result<StoredDocument, StoreError> {
        let slug = self.unique_slug(&document.title).await?;
        let processing = serde_json::to_value(&document.processing)
            .map_err(|e| StoreError::InvalidRecord(format!("processing metadata: {}", e)))?;

        let row: DocumentRow = sqlx::query_as::<Postgres, DocumentRow>(
            r#"
            INSERT INTO documents
                (id, title, slug, content, summary, archive_folder, archive_file_id,
                 processing, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            RETURNING id, title, slug, content, summary, archive_folder,
                      archive_file_id, created_at, updated_at, processing
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&document.title)
        .bind(&slug)
        .bind(&document.content)
        .bind(&document.summary)
        .bind(&document.archive_folder)
        .bind(&document.archive_file_id)
        .bind(processing)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            document_id = %row.id,
            slug = %row.slug,
            content_length = row.content.len(),
            "Document record created"
        );

        row.into_document()
    }
}
