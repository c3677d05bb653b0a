//! Configuration for ingestion runs
//!
//! Every component takes its configuration by value in its constructor; nothing
//! here is process-global, so runs against different slugs or databases can
//! coexist in one process.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Public MARS API host.
pub const DEFAULT_MARS_BASE_URL: &str = "https://marsapi.ams.usda.gov";

/// MARS API version path segment.
pub const DEFAULT_MARS_API_VERSION: &str = "v1.2";

/// Actual Slaughter Under Federal Inspection.
pub const DEFAULT_MARS_SLUG_ID: &str = "3658";

pub const DEFAULT_MARS_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MARS_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MARS_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MARS_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Pause between reports during backfills, to stay under the API rate limit.
pub const DEFAULT_MARS_REPORT_DELAY_MS: u64 = 1_000;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/livestock";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Rows per upsert transaction.
pub const DEFAULT_UPLOAD_BATCH_SIZE: usize = 100;

// ============================================================================
// Config structs
// ============================================================================

/// Top-level configuration for one ingestion run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    pub mars: MarsConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
}

/// Upstream MARS API settings
#[derive(Clone, Serialize, Deserialize)]
pub struct MarsConfig {
    /// API key sent as the basic-auth user name
    pub api_key: Option<String>,
    pub base_url: String,
    pub api_version: String,
    /// Report identifier
    pub slug_id: String,
    pub timeout_secs: u64,
    /// Total attempts per request, including the first
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub report_delay_ms: u64,
}

/// Destination database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Upload Coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub batch_size: usize,
}

impl IngestConfig {
    /// Load configuration from `.env`, the environment, and defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = IngestConfig {
            mars: MarsConfig {
                api_key: std::env::var("MARS_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                base_url: std::env::var("MARS_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_MARS_BASE_URL.to_string()),
                api_version: std::env::var("MARS_API_VERSION")
                    .unwrap_or_else(|_| DEFAULT_MARS_API_VERSION.to_string()),
                slug_id: std::env::var("MARS_SLUG_ID")
                    .unwrap_or_else(|_| DEFAULT_MARS_SLUG_ID.to_string()),
                timeout_secs: env_parse("MARS_TIMEOUT_SECS", DEFAULT_MARS_TIMEOUT_SECS),
                max_retries: env_parse("MARS_MAX_RETRIES", DEFAULT_MARS_MAX_RETRIES),
                retry_base_delay_ms: env_parse(
                    "MARS_RETRY_BASE_DELAY_MS",
                    DEFAULT_MARS_RETRY_BASE_DELAY_MS,
                ),
                retry_max_delay_ms: env_parse(
                    "MARS_RETRY_MAX_DELAY_MS",
                    DEFAULT_MARS_RETRY_MAX_DELAY_MS,
                ),
                report_delay_ms: env_parse("MARS_REPORT_DELAY_MS", DEFAULT_MARS_REPORT_DELAY_MS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            upload: UploadConfig {
                batch_size: env_parse("UPLOAD_BATCH_SIZE", DEFAULT_UPLOAD_BATCH_SIZE),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.mars.validate()?;
        self.database.validate()?;
        self.upload.validate()?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for MarsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_MARS_BASE_URL.to_string(),
            api_version: DEFAULT_MARS_API_VERSION.to_string(),
            slug_id: DEFAULT_MARS_SLUG_ID.to_string(),
            timeout_secs: DEFAULT_MARS_TIMEOUT_SECS,
            max_retries: DEFAULT_MARS_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_MARS_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_MARS_RETRY_MAX_DELAY_MS,
            report_delay_ms: DEFAULT_MARS_REPORT_DELAY_MS,
        }
    }
}

// Hand-written so the API key never reaches the logs.
impl std::fmt::Debug for MarsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarsConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("slug_id", &self.slug_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("report_delay_ms", &self.report_delay_ms)
            .finish()
    }
}

impl MarsConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_slug_id(mut self, slug_id: impl Into<String>) -> Self {
        self.slug_id = slug_id.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base and cap of the retry backoff
    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay_ms = base.as_millis() as u64;
        self.retry_max_delay_ms = max.as_millis() as u64;
        self
    }

    pub fn with_report_delay(mut self, delay: Duration) -> Self {
        self.report_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn report_delay(&self) -> Duration {
        Duration::from_millis(self.report_delay_ms)
    }

    /// `{base_url}/services/{api_version}/reports`
    pub fn reports_url(&self) -> String {
        format!(
            "{}/services/{}/reports",
            self.base_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(IngestError::Config("MARS base URL cannot be empty".to_string()));
        }

        if self.api_version.is_empty() {
            return Err(IngestError::Config("MARS API version cannot be empty".to_string()));
        }

        if self.slug_id.trim().is_empty() {
            return Err(IngestError::Config("MARS slug id cannot be empty".to_string()));
        }

        if self.timeout_secs == 0 {
            return Err(IngestError::Config("Timeout must be greater than 0".to_string()));
        }

        if self.max_retries == 0 {
            return Err(IngestError::Config(
                "max_retries must be at least 1 (it counts the first attempt)".to_string(),
            ));
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(IngestError::Config(format!(
                "Retry base delay ({} ms) cannot exceed max delay ({} ms)",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }

        Ok(())
    }

    /// Network modes need a key; local CSV imports do not
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| IngestError::Config("MARS_API_KEY is not set".to_string()))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl DatabaseConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(IngestError::Config("Database URL cannot be empty".to_string()));
        }

        if self.max_connections == 0 {
            return Err(IngestError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
        }
    }
}

impl UploadConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::Config("Batch size must be greater than 0".to_string()));
        }
        Ok(())
    }
}
