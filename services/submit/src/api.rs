use crate::config::ApiConfig;
use crate::error::{StoreError, SubmitError};
use crate::metadata_store::ContentRecordStore;
use crate::models::{InitUploadRequest, SubmitContentError, SubmitContentRequest, SubmitResponse};
use crate::object_store::ObjectStore;
use crate::workflow::SubmissionWorkflow;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<SubmissionWorkflow>,
    pub records: Arc<dyn ContentRecordStore>,
    pub objects: Arc<dyn ObjectStore>,
}

/// Response body together with the status it is sent with
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: SubmitResponse,
}

impl Reply {
    pub fn ok(body: SubmitResponse) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// Error body for `content_id`, status taken from the failure
    pub fn from_error(content_id: &str, err: &SubmitError) -> Self {
        Self {
            status: err.status_code(),
            body: SubmitResponse::Error(SubmitContentError {
                content_id: content_id.to_string(),
                message: err.to_string(),
            }),
        }
    }

    pub fn from_outcome(content_id: &str, outcome: Result<SubmitResponse, SubmitError>) -> Self {
        match outcome {
            Ok(body) => Self::ok(body),
            Err(err) => {
                if err.status_code().is_server_error() {
                    error!(content_id = %content_id, error = ?err, "Submission failed");
                } else {
                    warn!(content_id = %content_id, error = %err, "Submission rejected");
                }
                Self::from_error(content_id, &err)
            }
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Normalize a route prefix to `""` or `/segment[/segment...]`
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let prefix = normalize_prefix(&config.route_prefix);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(&format!("{prefix}/"), post(submit))
        .route(&format!("{prefix}/init-upload/"), post(init_upload))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "submit-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let records = state.records.health_check().await;
    let objects = state.objects.health_check().await;

    let status = if records.is_ok() && objects.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if status == StatusCode::OK { "ready" } else { "not_ready" },
            "records": probe_status(records),
            "objects": probe_status(objects),
        })),
    )
}

fn probe_status(result: Result<(), StoreError>) -> String {
    match result {
        Ok(()) => "connected".to_string(),
        Err(e) => e.to_string(),
    }
}

/// General submission of content
#[instrument(skip(state, request), fields(content_id = %request.content_id))]
async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitContentRequest>,
) -> Reply {
    let outcome = state.workflow.submit(&request).await;
    Reply::from_outcome(&request.content_id, outcome)
}

/// Presigned upload URL without registering a submission
#[instrument(skip(state, request), fields(content_id = %request.content_id))]
async fn init_upload(
    State(state): State<AppState>,
    Json(request): Json<InitUploadRequest>,
) -> Reply {
    let outcome = state
        .workflow
        .init_upload(&request)
        .await
        .map(SubmitResponse::InitUpload);
    Reply::from_outcome(&request.content_id, outcome)
}

/// Start the submit API server, stopping when `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(
        address = %addr,
        route_prefix = %normalize_prefix(&config.route_prefix),
        "Starting submit API server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::SubmitContentResponse;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/submit"), "/submit");
        assert_eq!(normalize_prefix("/submit/"), "/submit");
        assert_eq!(normalize_prefix("submit"), "/submit");
        assert_eq!(normalize_prefix("/api/submit/"), "/api/submit");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_reply_from_success() {
        let body = SubmitResponse::Success(SubmitContentResponse {
            content_id: "abc".to_string(),
            submit_successful: true,
        });
        let reply = Reply::from_outcome("abc", Ok(body.clone()));
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, body);
    }

    #[test]
    fn test_reply_from_error_echoes_content_id() {
        let reply = Reply::from_outcome(
            "abc",
            Err(SubmitError::UnreadableUrl(FetchError::Status(404))),
        );
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            reply.body,
            SubmitResponse::Error(SubmitContentError {
                content_id: "abc".to_string(),
                message: "url submitted could not be read from".to_string(),
            })
        );

        let reply = Reply::from_outcome(
            "xyz",
            Err(SubmitError::RecordWrite(StoreError::Objects("down".to_string()))),
        );
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body.content_id(), "xyz");
    }
}
