use axum::http::StatusCode;
use thiserror::Error;

/// Failures reported by the record and object store clients
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store error: {0}")]
    Records(#[from] sqlx::Error),

    #[error("object store error: {0}")]
    Objects(String),

    #[error("store backend does not support {0}")]
    Unsupported(&'static str),
}

/// Failures reading content from a remote URL
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote returned status {0}")]
    Status(u16),

    #[error("remote returned an empty body")]
    EmptyBody,

    #[error("remote body exceeds {0} bytes")]
    TooLarge(usize),
}

/// Reasons a submission did not complete
///
/// The `Display` text is what callers see in the error body.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("submission_type {0:?} not yet supported")]
    UnsupportedSubmissionType(String),

    #[error("content bytes are not valid base64: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    #[error("url submitted could not be read from")]
    UnreadableUrl(#[source] FetchError),

    #[error("presigned upload url could not be issued")]
    PresignFailed(#[source] StoreError),

    #[error("content record could not be written")]
    RecordWrite(#[source] StoreError),

    #[error("content bytes could not be stored")]
    ObjectWrite(#[source] StoreError),
}

impl SubmitError {
    /// HTTP status the failure is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubmitError::UnsupportedSubmissionType(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SubmitError::InvalidPayload(_)
            | SubmitError::UnreadableUrl(_)
            | SubmitError::PresignFailed(_)
            | SubmitError::ObjectWrite(_) => StatusCode::BAD_REQUEST,
            SubmitError::RecordWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::UnsupportedSubmissionType(_) => "unsupported_type",
            SubmitError::InvalidPayload(_) => "invalid_payload",
            SubmitError::UnreadableUrl(_) => "unreadable_url",
            SubmitError::PresignFailed(_) => "presign_failed",
            SubmitError::RecordWrite(_) => "record_write",
            SubmitError::ObjectWrite(_) => "object_write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            SubmitError::UnsupportedSubmissionType("Upload".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            SubmitError::UnreadableUrl(FetchError::Status(404)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SubmitError::PresignFailed(StoreError::Unsupported("presigned urls")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SubmitError::RecordWrite(StoreError::Objects("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages_name_the_problem() {
        let err = SubmitError::UnsupportedSubmissionType("Upload".into());
        assert_eq!(err.to_string(), "submission_type \"Upload\" not yet supported");

        let err = SubmitError::UnreadableUrl(FetchError::EmptyBody);
        assert_eq!(err.to_string(), "url submitted could not be read from");

        let err = SubmitError::UnreadableUrl(FetchError::TooLarge(16));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
