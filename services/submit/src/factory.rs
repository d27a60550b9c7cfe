use crate::config::{Config, ObjectBackend, RecordBackend};
use crate::fetcher::{HttpFetcher, RemoteFetcher};
use crate::metadata_store::{ContentRecordStore, InMemoryContentRecordStore, PgContentRecordStore};
use crate::object_store::{InMemoryObjectStore, ObjectStore, S3ObjectStore};
use crate::workflow::{SubmissionWorkflow, WorkflowSettings};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Create the content record store selected in configuration
pub async fn create_record_store(config: &Config) -> Result<Arc<dyn ContentRecordStore>> {
    match config.storage.records {
        RecordBackend::Postgres => {
            let store = PgContentRecordStore::new(&config.database)
                .await
                .context("Failed to initialize record store")?;

            if config.database.run_migrations {
                store
                    .run_migrations()
                    .await
                    .context("Failed to run database migrations")?;
            }

            Ok(Arc::new(store))
        }
        RecordBackend::Memory => {
            warn!("Using in-memory record store; records are lost on restart");
            Ok(Arc::new(InMemoryContentRecordStore::new()))
        }
    }
}

/// Create the object store selected in configuration
pub async fn create_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.objects {
        ObjectBackend::S3 => {
            let store = S3ObjectStore::new(&config.s3)
                .await
                .context("Failed to initialize S3 object store")?;
            Ok(Arc::new(store))
        }
        ObjectBackend::Memory => {
            warn!("Using in-memory object store; presigned uploads are unavailable");
            Ok(Arc::new(InMemoryObjectStore::new()))
        }
    }
}

/// Create the remote fetcher used by `FROM_URL` submissions
pub fn create_fetcher(config: &Config) -> Result<Arc<dyn RemoteFetcher>> {
    let fetcher = HttpFetcher::new(&config.fetch)?;
    Ok(Arc::new(fetcher))
}

/// Wire a workflow from explicit store handles
pub fn create_workflow(
    config: &Config,
    records: Arc<dyn ContentRecordStore>,
    objects: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn RemoteFetcher>,
) -> SubmissionWorkflow {
    info!(
        folder_prefix = %config.s3.folder_prefix,
        presigned_url_expiry_secs = config.s3.presigned_url_expiry_secs,
        "Submission workflow configured"
    );

    SubmissionWorkflow::new(
        records,
        objects,
        fetcher,
        WorkflowSettings {
            folder_prefix: config.s3.folder_prefix.clone(),
            presigned_url_expiry: config.presigned_url_expiry(),
        },
    )
}
