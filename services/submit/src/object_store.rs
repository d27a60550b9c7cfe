use crate::config::S3Config;
use crate::error::StoreError;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Byte storage for submitted content
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Issue a write-only URL that lets a client PUT `key` until it expires
    async fn presign_put_url(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError>;

    /// Cheap connectivity probe for readiness checks
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Object store backed by an S3 bucket
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    config: S3Config,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self::with_client(client, config))
    }

    /// Wrap an already configured client
    pub fn with_client(client: S3Client, config: &S3Config) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        }
    }

    /// Simple single-part upload for small objects
    async fn simple_upload(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| s3_error("PutObject", e))?;

        Ok(())
    }

    /// Multipart upload for large objects
    async fn multipart_upload(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("CreateMultipartUpload", e))?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| StoreError::Objects("no upload id in response".to_string()))?;

        let mut completed_parts = Vec::new();
        for (index, chunk) in body.chunks(self.config.part_size_bytes).enumerate() {
            let part_number = index as i32 + 1;

            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    self.abort_multipart_upload(key, upload_id).await;
                    return Err(s3_error("UploadPart", e));
                }
            };

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| s3_error("CompleteMultipartUpload", e))?;

        Ok(())
    }

    /// Best effort; S3 lifecycle rules clean up anything this misses
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(key = %key, error = %e, "Failed to abort multipart upload");
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, body), fields(key = %key, size_bytes = body.len()))]
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let size_bytes = body.len();

        if self.config.uses_multipart(size_bytes) {
            self.multipart_upload(key, body).await?;
        } else {
            self.simple_upload(key, body).await?;
        }

        info!(key = %key, size_bytes, "Content stored in S3");
        metrics::counter!("submit.objects.stored").increment(1);

        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn presign_put_url(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| s3_error("PresigningConfig", e))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config)
            .await
            .map_err(|e| s3_error("presigning PutObject", e))?;

        debug!(expires_in_secs = expires_in.as_secs(), "Generated presigned PUT URL");

        Ok(presigned.uri().to_string())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| s3_error("HeadBucket", e))?;
        Ok(())
    }
}

fn s3_error<E: std::error::Error>(operation: &str, err: E) -> StoreError {
    StoreError::Objects(format!("{operation} failed: {}", DisplayErrorContext(err)))
}

/// Object store held in process memory
///
/// Clients cannot reach it from outside the process, so presigned URLs are
/// not supported.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the bytes stored under `key`
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().get(key).cloned()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        debug!(key = %key, size_bytes = body.len(), "Content stored in memory");
        self.objects.write().insert(key.to_string(), body);
        metrics::counter!("submit.objects.stored").increment(1);
        Ok(())
    }

    async fn presign_put_url(
        &self,
        _key: &str,
        _content_type: &str,
        _expires_in: Duration,
    ) -> Result<String, StoreError> {
        Err(StoreError::Unsupported("presigned upload urls"))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{Credentials, Region};

    /// S3 store with static credentials; presigning never leaves the process
    fn offline_s3_store() -> S3ObjectStore {
        let config = S3Config {
            bucket: "hma".to_string(),
            ..S3Config::default()
        };
        let client_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                "AKIDEXAMPLE",
                "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
                None,
                None,
                "static",
            ))
            .build();

        S3ObjectStore::with_client(S3Client::from_conf(client_config), &config)
    }

    #[tokio::test]
    async fn test_s3_presigned_url_is_bounded_and_typed() {
        let store = offline_s3_store();

        let url = store
            .presign_put_url("images/abc", "image/jpeg", Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(url.starts_with("https://hma.s3.us-east-1.amazonaws.com/images/abc?"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-SignedHeaders=content-type%3Bhost"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_s3_presigned_url_follows_requested_expiry() {
        let store = offline_s3_store();

        let url = store
            .presign_put_url("images/abc", "image/png", Duration::from_secs(900))
            .await
            .unwrap();
        assert!(url.contains("X-Amz-Expires=900"));

        // S3 caps presigned URLs at one week
        let result = store
            .presign_put_url("images/abc", "image/png", Duration::from_secs(8 * 24 * 60 * 60))
            .await;
        assert!(matches!(result, Err(StoreError::Objects(_))));
    }

    #[tokio::test]
    async fn test_in_memory_put_overwrites() {
        let store = InMemoryObjectStore::new();
        store.put_object("images/abc", b"one".to_vec()).await.unwrap();
        store.put_object("images/abc", b"two".to_vec()).await.unwrap();

        assert_eq!(store.get("images/abc").as_deref(), Some(&b"two"[..]));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_keys_are_not_escaped() {
        let store = InMemoryObjectStore::new();
        store.put_object("images/a/b", b"x".to_vec()).await.unwrap();
        assert!(store.get("images/a/b").is_some());
        assert!(store.get("images/a_b").is_none());
    }

    #[tokio::test]
    async fn test_in_memory_presign_unsupported() {
        let store = InMemoryObjectStore::new();
        let result = store
            .presign_put_url("images/abc", "image/jpeg", Duration::from_secs(3600))
            .await;

        assert!(matches!(result, Err(StoreError::Unsupported(_))));
        assert!(store.is_empty());
    }
}
