//! HMA Submit Service
//!
//! Content submission entry point for the hasher-matcher-actioner media
//! matching pipeline. Callers submit an image by presigned upload, by direct
//! base64 bytes, or by a remote URL. The service records a content record and
//! gets the bytes into the object store, where downstream hashing picks them
//! up.
//!
//! ## Submission strategies
//!
//! - **`DIRECT_UPLOAD`**: bytes in the request body, recorded then stored
//! - **`POST_URL_UPLOAD`**: a presigned PUT URL is issued, then recorded; the
//!   caller uploads the bytes itself
//! - **`FROM_URL`**: the service fetches the URL and, if it returned bytes,
//!   records then stores them
//!
//! ## Architecture
//!
//! ```text
//!  POST /submit/             ┌──────────────┐        PostgreSQL
//!  POST /submit/init-upload/ │ Submission   │       ┌──────────────┐
//! ──────────────────────────▶│ Workflow     │──────▶│ content_     │
//!                            │              │       │ objects      │
//!                            └──────────────┘       └──────────────┘
//!                              │        ▲
//!                              │        │ FROM_URL
//!                              ▼        │
//!                       ┌──────────┐  ┌──────────────┐
//!                       │ S3       │  │ Remote       │
//!                       │ {prefix} │  │ Fetcher      │
//!                       │ {id}     │  └──────────────┘
//!                       └──────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod factory;
pub mod fetcher;
pub mod metadata_store;
pub mod models;
pub mod object_store;
pub mod workflow;

pub use api::{AppState, Reply};
pub use config::Config;
pub use error::{FetchError, StoreError, SubmitError};
pub use fetcher::{HttpFetcher, RemoteFetcher};
pub use metadata_store::{ContentRecordStore, InMemoryContentRecordStore, PgContentRecordStore};
pub use models::{
    ContentRecord, InitUploadRequest, InitUploadResponse, SubmissionType, SubmitContentError,
    SubmitContentRequest, SubmitContentResponse, SubmitResponse,
};
pub use object_store::{InMemoryObjectStore, ObjectStore, S3ObjectStore};
pub use workflow::{SubmissionWorkflow, WorkflowSettings};
