use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::ContentRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Persistence for content records
///
/// `upsert` overwrites every field of an existing record except
/// `submission_times`, which is appended to. Implementations must make that
/// append atomic with respect to concurrent upserts of the same key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentRecordStore: Send + Sync {
    /// Create or overwrite the record, appending its submission times
    async fn upsert(&self, record: &ContentRecord) -> Result<(), StoreError>;

    /// Fetch a record by key
    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>, StoreError>;

    /// Cheap connectivity probe for readiness checks
    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, FromRow)]
struct ContentRecordRow {
    content_id: String,
    content_type: String,
    content_ref: String,
    content_ref_type: String,
    additional_fields: Vec<String>,
    submission_times: Vec<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContentRecordRow> for ContentRecord {
    fn from(row: ContentRecordRow) -> Self {
        Self {
            content_id: row.content_id,
            content_type: row.content_type,
            content_ref: row.content_ref,
            content_ref_type: row.content_ref_type,
            additional_fields: row.additional_fields.into_iter().collect(),
            submission_times: row.submission_times,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Content record store backed by PostgreSQL
pub struct PgContentRecordStore {
    pool: PgPool,
}

impl PgContentRecordStore {
    /// Create a new record store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl ContentRecordStore for PgContentRecordStore {
    #[instrument(skip(self, record), fields(content_id = %record.content_id))]
    async fn upsert(&self, record: &ContentRecord) -> Result<(), StoreError> {
        let additional_fields: Vec<String> = record.additional_fields.iter().cloned().collect();

        // Single statement so concurrent resubmissions cannot lose a timestamp
        sqlx::query(
            r#"
            INSERT INTO content_objects (
                content_id, content_type, content_ref, content_ref_type,
                additional_fields, submission_times, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8
            )
            ON CONFLICT (content_id) DO UPDATE SET
                content_type = EXCLUDED.content_type,
                content_ref = EXCLUDED.content_ref,
                content_ref_type = EXCLUDED.content_ref_type,
                additional_fields = EXCLUDED.additional_fields,
                submission_times = content_objects.submission_times || EXCLUDED.submission_times,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.content_id)
        .bind(&record.content_type)
        .bind(&record.content_ref)
        .bind(&record.content_ref_type)
        .bind(&additional_fields)
        .bind(&record.submission_times)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Content record written");
        metrics::counter!("submit.records.written").increment(1);

        Ok(())
    }

    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>, StoreError> {
        let row = sqlx::query_as::<_, ContentRecordRow>(
            r#"
            SELECT content_id, content_type, content_ref, content_ref_type,
                   additional_fields, submission_times, created_at, updated_at
            FROM content_objects
            WHERE content_id = $1
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Content record store held in process memory
///
/// For local development and tests; records are lost on restart.
#[derive(Default)]
pub struct InMemoryContentRecordStore {
    records: RwLock<HashMap<String, ContentRecord>>,
}

impl InMemoryContentRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ContentRecordStore for InMemoryContentRecordStore {
    async fn upsert(&self, record: &ContentRecord) -> Result<(), StoreError> {
        let mut record = record.clone();
        let mut records = self.records.write();
        if let Some(previous) = records.get(&record.content_id) {
            record.append_history(previous);
        }
        debug!(content_id = %record.content_id, "Content record written");
        records.insert(record.content_id.clone(), record);
        metrics::counter!("submit.records.written").increment(1);
        Ok(())
    }

    async fn get(&self, content_id: &str) -> Result<Option<ContentRecord>, StoreError> {
        Ok(self.records.read().get(content_id).cloned())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubmissionType, SubmitContentRequest};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn record(content_type: &str, at: DateTime<Utc>) -> ContentRecord {
        let request = SubmitContentRequest {
            submission_type: "DIRECT_UPLOAD".to_string(),
            content_id: "abc".to_string(),
            content_type: Some(content_type.to_string()),
            content_bytes_url_or_file_type: String::new(),
            additional_fields: None,
        };
        ContentRecord::for_submission("images/abc", &request, SubmissionType::DirectUpload, at)
    }

    #[tokio::test]
    async fn test_in_memory_upsert_appends_submission_times() {
        let store = InMemoryContentRecordStore::new();
        let first = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap();

        store.upsert(&record("photo", first)).await.unwrap();
        store.upsert(&record("video", second)).await.unwrap();

        let stored = store.get("images/abc").await.unwrap().unwrap();
        assert_eq!(stored.submission_times, vec![first, second]);
        assert_eq!(stored.content_type, "video");
        assert_eq!(stored.created_at, first);
        assert_eq!(stored.updated_at, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_get_missing() {
        let store = InMemoryContentRecordStore::new();
        assert!(store.get("images/nope").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_concurrent_upserts_keep_every_time() {
        let store = Arc::new(InMemoryContentRecordStore::new());
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .upsert(&record("photo", base + chrono::Duration::seconds(i)))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get("images/abc").await.unwrap().unwrap();
        assert_eq!(stored.submission_times.len(), 16);
    }

    #[test]
    fn test_row_conversion_dedupes_fields() {
        let now = Utc::now();
        let row = ContentRecordRow {
            content_id: "images/abc".to_string(),
            content_type: "photo".to_string(),
            content_ref: "images/abc".to_string(),
            content_ref_type: "Upload".to_string(),
            additional_fields: vec!["x".to_string(), "x".to_string(), "y".to_string()],
            submission_times: vec![now],
            created_at: now,
            updated_at: now,
        };

        let record: ContentRecord = row.into();
        assert_eq!(record.additional_fields.len(), 2);
        assert_eq!(record.submission_times, vec![now]);
    }
}
