use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Content type recorded when the caller does not give one
pub const DEFAULT_CONTENT_TYPE: &str = "photo";

/// Supported ways of getting content bytes into the object store
///
/// Requests name a strategy by its symbolic name (`DIRECT_UPLOAD`), never by
/// the human-readable label shown in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionType {
    /// Caller uploads the bytes itself through a presigned URL
    PostUrlUpload,
    /// Bytes arrive base64-encoded in the request body
    DirectUpload,
    /// Service copies the bytes from a remote URL
    FromUrl,
}

impl SubmissionType {
    pub const ALL: [SubmissionType; 3] = [
        SubmissionType::PostUrlUpload,
        SubmissionType::DirectUpload,
        SubmissionType::FromUrl,
    ];

    /// Symbolic name accepted on the wire
    pub fn name(&self) -> &'static str {
        match self {
            SubmissionType::PostUrlUpload => "POST_URL_UPLOAD",
            SubmissionType::DirectUpload => "DIRECT_UPLOAD",
            SubmissionType::FromUrl => "FROM_URL",
        }
    }

    /// Human-readable label shown to operators
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionType::PostUrlUpload => "Upload",
            SubmissionType::DirectUpload => {
                "Direct Upload (~faster but only works for images < 3.5MB)"
            }
            SubmissionType::FromUrl => "From URL",
        }
    }

    /// Value stored in `ContentRecord::content_ref_type`
    pub fn ref_type(&self) -> &'static str {
        match self {
            SubmissionType::PostUrlUpload => "Upload",
            SubmissionType::DirectUpload => "Direct Upload",
            SubmissionType::FromUrl => "From URL",
        }
    }

    /// Look up a strategy by symbolic name. Labels do not match.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Body of `POST {prefix}/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitContentRequest {
    /// Symbolic `SubmissionType` name
    pub submission_type: String,
    pub content_id: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Base64 payload, remote URL or MIME type, depending on the strategy
    pub content_bytes_url_or_file_type: String,
    #[serde(default)]
    pub additional_fields: Option<Vec<String>>,
}

/// Body of `POST {prefix}/init-upload/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitUploadRequest {
    pub content_id: String,
    pub file_type: String,
}

/// Metadata kept for every submitted content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Record key: folder prefix + caller content id
    pub content_id: String,
    pub content_type: String,
    /// Object store key holding (or about to hold) the bytes
    pub content_ref: String,
    pub content_ref_type: String,
    pub additional_fields: BTreeSet<String>,
    /// One entry per submission, oldest first
    pub submission_times: Vec<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Build the record for one submission made at `submitted_at`
    pub fn for_submission(
        key: &str,
        request: &SubmitContentRequest,
        submission_type: SubmissionType,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let content_type = request
            .content_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        Self {
            content_id: key.to_string(),
            content_type,
            content_ref: key.to_string(),
            content_ref_type: submission_type.ref_type().to_string(),
            additional_fields: request
                .additional_fields
                .iter()
                .flatten()
                .cloned()
                .collect(),
            submission_times: vec![submitted_at],
            created_at: submitted_at,
            updated_at: submitted_at,
        }
    }

    /// Keep the submission history of a record this one overwrites
    ///
    /// `created_at` stays at the first submission; every other field keeps
    /// the newer value.
    pub fn append_history(&mut self, previous: &ContentRecord) {
        self.created_at = previous.created_at;
        let mut times = previous.submission_times.clone();
        times.append(&mut self.submission_times);
        self.submission_times = times;
    }
}

/// Reply to a completed direct or from-URL submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitContentResponse {
    pub content_id: String,
    pub submit_successful: bool,
}

/// Reply carrying a presigned upload URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitUploadResponse {
    pub content_id: String,
    pub file_type: String,
    pub presigned_url: String,
}

/// Reply for a failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitContentError {
    pub content_id: String,
    pub message: String,
}

/// Everything the submit endpoints can answer with
///
/// Serialized untagged: each variant is identified by its field set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SubmitResponse {
    Success(SubmitContentResponse),
    InitUpload(InitUploadResponse),
    Error(SubmitContentError),
}

impl SubmitResponse {
    pub fn content_id(&self) -> &str {
        match self {
            SubmitResponse::Success(r) => &r.content_id,
            SubmitResponse::InitUpload(r) => &r.content_id,
            SubmitResponse::Error(r) => &r.content_id,
        }
    }
}
