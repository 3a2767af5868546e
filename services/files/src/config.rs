use crate::content_type::ContentTypeSource;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the files service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 / MinIO configuration
    pub s3: S3Config,
    /// Metadata database configuration
    pub database: DatabaseConfig,
    /// Registry behaviour
    #[serde(default)]
    pub registry: RegistryConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Expose Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Host and port of the S3-compatible endpoint, e.g. `localhost:9000`.
    /// A full URL (`http://...`) is accepted as-is.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Access key id
    #[serde(default = "default_credential")]
    pub access_key: String,
    /// Secret access key
    #[serde(default = "default_credential")]
    pub secret_key: String,
    /// Bucket holding file content
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Use TLS when talking to the endpoint
    #[serde(default)]
    pub secure: bool,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Force path-style access (required for MinIO)
    #[serde(default = "default_true")]
    pub force_path_style: bool,
    /// Create the bucket on startup when it does not exist
    #[serde(default = "default_true")]
    pub create_bucket: bool,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL or plain file path
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Order in which content type sources are consulted on upload.
    /// `defaulted` is always the final fallback.
    #[serde(default = "default_content_type_order")]
    pub content_type_order: Vec<ContentTypeSource>,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Largest accepted upload body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

// Default value functions
fn default_service_name() -> String {
    "files-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_endpoint() -> String {
    "localhost:9000".to_string()
}

fn default_credential() -> String {
    "minioadmin".to_string()
}

fn default_bucket() -> String {
    "files".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_database_url() -> String {
    "files.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_content_type_order() -> Vec<ContentTypeSource> {
    vec![ContentTypeSource::Declared, ContentTypeSource::Sniffed]
}

fn default_true() -> bool {
    true
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024 // 100MB
}

impl Config {
    /// Load configuration from `.env`, config files and environment
    pub fn load() -> anyhow::Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/files").required(false))
            .add_source(config::File::with_name("/etc/files/files").required(false))
            // Override with environment variables
            // FILES__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("FILES")
                    .separator("__")
                    .try_parsing(true),
            )
            // Flat variables understood by earlier deployments
            .set_override_option("s3.endpoint", env_var("MINIO_ENDPOINT"))?
            .set_override_option("s3.access_key", env_var("MINIO_ACCESS_KEY"))?
            .set_override_option("s3.secret_key", env_var("MINIO_SECRET_KEY"))?
            .set_override_option("s3.bucket", env_var("MINIO_BUCKET"))?
            .set_override_option(
                "s3.secure",
                env_var("MINIO_SECURE").map(|v| v.eq_ignore_ascii_case("true")),
            )?
            .set_override_option("database.url", env_var("DATABASE_PATH"))?
            // Both sections are optional in the sources above
            .set_default("s3.bucket", default_bucket())?
            .set_default("database.url", default_database_url())?
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints the deserializer cannot express
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.s3.endpoint.trim().is_empty() {
            return Err(ConfigValidationError::MissingField("s3.endpoint".to_string()));
        }
        if self.s3.bucket.trim().is_empty() {
            return Err(ConfigValidationError::MissingField("s3.bucket".to_string()));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigValidationError::MissingField("database.url".to_string()));
        }
        if self.api.max_upload_bytes == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "api.max_upload_bytes".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.s3.part_size_bytes < 5 * 1024 * 1024 {
            return Err(ConfigValidationError::InvalidValue {
                field: "s3.part_size_bytes".to_string(),
                message: "S3 requires parts of at least 5MB".to_string(),
            });
        }

        let order = &self.registry.content_type_order;
        for (i, source) in order.iter().enumerate() {
            if order[..i].contains(source) {
                return Err(ConfigValidationError::InvalidValue {
                    field: "registry.content_type_order".to_string(),
                    message: format!("{source:?} listed more than once"),
                });
            }
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl S3Config {
    /// Endpoint as a URL, adding the scheme implied by `secure`
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            return self.endpoint.clone();
        }
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.endpoint)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_enabled: true,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            content_type_order: default_content_type_order(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
