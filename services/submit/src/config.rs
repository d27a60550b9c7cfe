use anyhow::{bail, Context};
use serde::Deserialize;
use std::time::Duration;

/// Longest presigned URL lifetime S3 accepts (7 days)
const MAX_PRESIGNED_URL_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// Smallest multipart part S3 accepts, other than the last one
const MIN_PART_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Main configuration for the submit service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    /// Submit endpoints
    #[serde(default)]
    pub api: ApiConfig,
    /// Backend selection
    #[serde(default)]
    pub storage: StorageConfig,
    /// Bucket holding submitted bytes
    #[serde(default)]
    pub s3: S3Config,
    /// Postgres holding content records
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Remote fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Process identity, log filter and metrics listener
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name reported in logs
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port of the Prometheus scrape endpoint
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Submit HTTP surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Prefix the submit routes are mounted under
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
    /// Allow browser callers from other origins
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Which backend implementation serves each store
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub records: RecordBackend,
    #[serde(default)]
    pub objects: ObjectBackend,
}

/// Content record store backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    #[default]
    Postgres,
    Memory,
}

/// Object store backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectBackend {
    #[default]
    S3,
    Memory,
}

/// Bucket and key layout for submitted content
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Required when `storage.objects = "s3"`
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// S3-compatible endpoint, e.g. a local MinIO
    pub endpoint_url: Option<String>,
    /// Address the bucket as a path segment rather than a subdomain
    #[serde(default)]
    pub force_path_style: bool,
    /// Prefix prepended to every content id to form object and record keys
    #[serde(default = "default_folder_prefix")]
    pub folder_prefix: String,
    /// Presigned upload URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Payloads at or above this size go up in parts
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// At least 5 MiB; S3 rejects smaller parts except the last
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Connection pool for the content record table
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Required when `storage.records = "postgres"`
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds before an idle connection is closed
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Apply `migrations/` before serving
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Remote content fetch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds; unset leaves the HTTP client default
    pub timeout_secs: Option<u64>,
    /// User agent sent with remote fetches
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Largest remote body accepted; bigger ones count as unreadable
    #[serde(default = "default_fetch_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_service_name() -> String {
    "submit-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_route_prefix() -> String {
    "/submit".to_string()
}

fn default_max_body_bytes() -> usize {
    8 * 1024 * 1024 // base64 of a 3.5MB image plus envelope
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_folder_prefix() -> String {
    "images/".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    3600
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024
}

fn default_part_size() -> usize {
    8 * 1024 * 1024
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_user_agent() -> String {
    concat!("submit-service/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_fetch_max_body_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Layer defaults, `config/submit`, `/etc/hma/submit` and `SUBMIT__*` variables
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "submit-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/submit").required(false))
            .add_source(config::File::with_name("/etc/hma/submit").required(false))
            // SUBMIT__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("SUBMIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the selected backends have what they need
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.objects == ObjectBackend::S3 && self.s3.bucket.trim().is_empty() {
            bail!("s3.bucket must be set when storage.objects = \"s3\"");
        }
        if self.storage.records == RecordBackend::Postgres && self.database.url.trim().is_empty() {
            bail!("database.url must be set when storage.records = \"postgres\"");
        }
        if !(1..=MAX_PRESIGNED_URL_EXPIRY_SECS).contains(&self.s3.presigned_url_expiry_secs) {
            bail!(
                "s3.presigned_url_expiry_secs must be between 1 and {}",
                MAX_PRESIGNED_URL_EXPIRY_SECS
            );
        }
        if self.s3.part_size_bytes < MIN_PART_SIZE_BYTES {
            bail!("s3.part_size_bytes must be at least {MIN_PART_SIZE_BYTES}");
        }
        Ok(())
    }

    /// Lifetime of issued upload URLs
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.presigned_url_expiry_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            route_prefix: default_route_prefix(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl S3Config {
    /// Whether a payload of `size_bytes` is uploaded in parts
    pub fn uses_multipart(&self, size_bytes: usize) -> bool {
        size_bytes >= self.multipart_threshold_bytes
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            folder_prefix: default_folder_prefix(),
            presigned_url_expiry_secs: default_presigned_url_expiry_secs(),
            multipart_threshold_bytes: default_multipart_threshold(),
            part_size_bytes: default_part_size(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            run_migrations: default_true(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: default_user_agent(),
            max_body_bytes: default_fetch_max_body_bytes(),
        }
    }
}
