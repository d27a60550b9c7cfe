//! Submission workflow
//!
//! Decides which strategy handles a request and sequences the record write
//! against the byte write:
//!
//! | strategy          | order                                   |
//! |-------------------|-----------------------------------------|
//! | `DIRECT_UPLOAD`   | decode, record, put bytes               |
//! | `POST_URL_UPLOAD` | presign, record (only if presign works) |
//! | `FROM_URL`        | fetch, record (only if non-empty), put  |
//!
//! A record is never rolled back. If the byte write after it fails, the
//! record is left pointing at a key with no object behind it and the failure
//! is logged as an orphaned record.

use crate::error::{FetchError, StoreError, SubmitError};
use crate::fetcher::RemoteFetcher;
use crate::metadata_store::ContentRecordStore;
use crate::models::{
    ContentRecord, InitUploadRequest, InitUploadResponse, SubmissionType, SubmitContentRequest,
    SubmitContentResponse, SubmitResponse,
};
use crate::object_store::ObjectStore;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Standard alphabet, padding required, stray trailing bits tolerated
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Settings the workflow needs from configuration
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Prepended to content ids to form object and record keys
    pub folder_prefix: String,
    /// Lifetime of issued upload URLs
    pub presigned_url_expiry: Duration,
}

/// Gets submitted content into storage with a matching record
pub struct SubmissionWorkflow {
    records: Arc<dyn ContentRecordStore>,
    objects: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    settings: WorkflowSettings,
}

impl SubmissionWorkflow {
    pub fn new(
        records: Arc<dyn ContentRecordStore>,
        objects: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn RemoteFetcher>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            records,
            objects,
            fetcher,
            settings,
        }
    }

    /// Object and record key for a content id
    pub fn storage_key(&self, content_id: &str) -> String {
        format!("{}{}", self.settings.folder_prefix, content_id)
    }

    /// Handle `POST {prefix}/`
    #[instrument(
        skip(self, request),
        fields(content_id = %request.content_id, submission_type = %request.submission_type)
    )]
    pub async fn submit(
        &self,
        request: &SubmitContentRequest,
    ) -> Result<SubmitResponse, SubmitError> {
        debug!("Content submit request received");

        let Some(submission_type) = SubmissionType::from_name(&request.submission_type) else {
            metrics::counter!(
                "submit.requests",
                "strategy" => "unknown",
                "outcome" => "unsupported_type"
            )
            .increment(1);
            return Err(SubmitError::UnsupportedSubmissionType(
                request.submission_type.clone(),
            ));
        };

        let result = match submission_type {
            SubmissionType::DirectUpload => self.direct_upload(request).await,
            SubmissionType::PostUrlUpload => self.post_url_upload(request).await,
            SubmissionType::FromUrl => self.from_url(request).await,
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::counter!(
            "submit.requests",
            "strategy" => submission_type.name(),
            "outcome" => outcome
        )
        .increment(1);

        result
    }

    /// Handle `POST {prefix}/init-upload/`: a URL only, no record
    #[instrument(skip(self, request), fields(content_id = %request.content_id))]
    pub async fn init_upload(
        &self,
        request: &InitUploadRequest,
    ) -> Result<InitUploadResponse, SubmitError> {
        let key = self.storage_key(&request.content_id);
        let presigned_url = self.issue_upload_url(&key, &request.file_type).await?;

        Ok(InitUploadResponse {
            content_id: request.content_id.clone(),
            file_type: request.file_type.clone(),
            presigned_url,
        })
    }

    /// Bytes arrive base64-encoded in the request
    async fn direct_upload(
        &self,
        request: &SubmitContentRequest,
    ) -> Result<SubmitResponse, SubmitError> {
        let bytes = decode_payload(&request.content_bytes_url_or_file_type)?;

        let key = self.record_submission(request, SubmissionType::DirectUpload).await?;
        self.store_bytes(&key, bytes).await?;

        Ok(success(request))
    }

    /// Caller uploads through a presigned URL; nothing to record unless one was issued
    async fn post_url_upload(
        &self,
        request: &SubmitContentRequest,
    ) -> Result<SubmitResponse, SubmitError> {
        let file_type = &request.content_bytes_url_or_file_type;
        let key = self.storage_key(&request.content_id);
        let presigned_url = self.issue_upload_url(&key, file_type).await?;

        self.record_submission(request, SubmissionType::PostUrlUpload)
            .await?;

        Ok(SubmitResponse::InitUpload(InitUploadResponse {
            content_id: request.content_id.clone(),
            file_type: file_type.clone(),
            presigned_url,
        }))
    }

    /// Copy bytes from a remote URL; an unreadable URL leaves no trace
    async fn from_url(
        &self,
        request: &SubmitContentRequest,
    ) -> Result<SubmitResponse, SubmitError> {
        let url = &request.content_bytes_url_or_file_type;

        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) if bytes.is_empty() => Err(FetchError::EmptyBody),
            other => other,
        }
        .map_err(|e| {
            warn!(url = %url, error = %e, "Submitted url could not be read");
            SubmitError::UnreadableUrl(e)
        })?;

        let key = self.record_submission(request, SubmissionType::FromUrl).await?;
        self.store_bytes(&key, bytes).await?;

        Ok(success(request))
    }

    /// Write the content record and return its key
    async fn record_submission(
        &self,
        request: &SubmitContentRequest,
        submission_type: SubmissionType,
    ) -> Result<String, SubmitError> {
        let key = self.storage_key(&request.content_id);
        let record = ContentRecord::for_submission(&key, request, submission_type, Utc::now());

        self.records
            .upsert(&record)
            .await
            .map_err(SubmitError::RecordWrite)?;

        debug!(key = %key, "Content submission recorded");
        Ok(key)
    }

    /// Put bytes for an already recorded submission
    async fn store_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), SubmitError> {
        let size_bytes = bytes.len();

        if let Err(e) = self.objects.put_object(key, bytes).await {
            warn!(
                key = %key,
                error = %e,
                "Content record written but bytes were not stored; record is orphaned"
            );
            metrics::counter!("submit.orphaned_records").increment(1);
            return Err(SubmitError::ObjectWrite(e));
        }

        info!(key = %key, size_bytes, "Content submitted");
        Ok(())
    }

    async fn issue_upload_url(&self, key: &str, file_type: &str) -> Result<String, SubmitError> {
        let url = self
            .objects
            .presign_put_url(key, file_type, self.settings.presigned_url_expiry)
            .await
            .map_err(|e| {
                warn!(key = %key, error = %e, "Presigned upload url could not be issued");
                SubmitError::PresignFailed(e)
            })?;

        if url.is_empty() {
            return Err(SubmitError::PresignFailed(StoreError::Objects(
                "object store returned an empty url".to_string(),
            )));
        }

        metrics::counter!("submit.presigned_urls.issued").increment(1);
        Ok(url)
    }
}

/// Decode base64 content, skipping anything outside the alphabet
///
/// Line-wrapped (MIME style) payloads decode the same as unwrapped ones.
fn decode_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded: Vec<u8> = payload
        .bytes()
        .filter(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
        .collect();
    PAYLOAD_ENGINE.decode(encoded)
}

fn success(request: &SubmitContentRequest) -> SubmitResponse {
    SubmitResponse::Success(SubmitContentResponse {
        content_id: request.content_id.clone(),
        submit_successful: true,
    })
}
