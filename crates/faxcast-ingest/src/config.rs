//! Configuration for the ingestion pipeline.
//!
//! Use [`IngestConfig::builder()`] for programmatic setup, or
//! [`IngestConfig::from_env()`] to overlay `FAXCAST_*` environment variables on
//! the defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of rows materialized per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default pause between batches, in milliseconds.
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 100;

const ENV_MAX_FILE_SIZE: &str = "FAXCAST_MAX_FILE_SIZE_BYTES";
const ENV_BATCH_SIZE: &str = "FAXCAST_BATCH_SIZE";
const ENV_BATCH_PAUSE: &str = "FAXCAST_BATCH_PAUSE_MS";
const ENV_TOLL_FREE_BASELINE: &str = "FAXCAST_TOLL_FREE_BASELINE";
const ENV_STORED_BASELINE: &str = "FAXCAST_STORED_BASELINE";

/// Configuration for header extraction, materialization and reconciliation.
///
/// # Example
///
/// ```rust,ignore
/// use faxcast_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .batch_size(500)
///     .batch_pause_ms(0)
///     .toll_free_baseline(1250)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Files larger than this are rejected before entering the pipeline.
    /// Default: 10 MiB
    pub max_file_size_bytes: u64,

    /// Rows per materialization batch. Progress is published once per batch.
    /// Default: 1000
    pub batch_size: usize,

    /// Pause between batches in milliseconds. 0 disables pacing.
    /// Default: 100
    pub batch_pause_ms: u64,

    /// Numbers blocked through the account's toll-free opt-out line.
    /// Default: 0
    pub toll_free_baseline: usize,

    /// Numbers on the account's stored block list.
    /// Default: 0
    pub stored_baseline: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause_ms: DEFAULT_BATCH_PAUSE_MS,
            toll_free_baseline: 0,
            stored_baseline: 0,
        }
    }
}

impl IngestConfig {
    /// Create a new configuration builder.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Defaults overlaid with `FAXCAST_*` environment variables.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honored.
    pub fn from_env() -> Result<Self, ConfigValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values returned by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(value) = lookup(ENV_MAX_FILE_SIZE) {
            builder = builder.max_file_size_bytes(parse_var(ENV_MAX_FILE_SIZE, &value)?);
        }
        if let Some(value) = lookup(ENV_BATCH_SIZE) {
            builder = builder.batch_size(parse_var(ENV_BATCH_SIZE, &value)?);
        }
        if let Some(value) = lookup(ENV_BATCH_PAUSE) {
            builder = builder.batch_pause_ms(parse_var(ENV_BATCH_PAUSE, &value)?);
        }
        if let Some(value) = lookup(ENV_TOLL_FREE_BASELINE) {
            builder = builder.toll_free_baseline(parse_var(ENV_TOLL_FREE_BASELINE, &value)?);
        }
        if let Some(value) = lookup(ENV_STORED_BASELINE) {
            builder = builder.stored_baseline(parse_var(ENV_STORED_BASELINE, &value)?);
        }

        builder.build()
    }

    /// Pause inserted between batches.
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.batch_size == 0 {
            return Err(ConfigValidationError::InvalidBatchSize(self.batch_size));
        }

        if self.max_file_size_bytes == 0 {
            return Err(ConfigValidationError::InvalidFileSizeLimit(
                self.max_file_size_bytes,
            ));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigValidationError::InvalidEnvValue {
            var: var.to_string(),
            value: value.to_string(),
        })
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    #[error("Invalid file size limit: {0} (must be at least 1 byte)")]
    InvalidFileSizeLimit(u64),

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnvValue { var: String, value: String },
}

impl From<ConfigValidationError> for crate::error::IngestError {
    fn from(err: ConfigValidationError) -> Self {
        crate::error::IngestError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`IngestConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    max_file_size_bytes: Option<u64>,
    batch_size: Option<usize>,
    batch_pause_ms: Option<u64>,
    toll_free_baseline: Option<usize>,
    stored_baseline: Option<usize>,
}

impl IngestConfigBuilder {
    /// Set the upload size limit in bytes.
    pub fn max_file_size_bytes(mut self, limit: u64) -> Self {
        self.max_file_size_bytes = Some(limit);
        self
    }

    /// Set the number of rows per materialization batch.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the pause between batches. Use 0 to disable pacing (tests, CLI).
    pub fn batch_pause_ms(mut self, millis: u64) -> Self {
        self.batch_pause_ms = Some(millis);
        self
    }

    /// Set the toll-free opt-out baseline count.
    pub fn toll_free_baseline(mut self, count: usize) -> Self {
        self.toll_free_baseline = Some(count);
        self
    }

    /// Set the stored block list baseline count.
    pub fn stored_baseline(mut self, count: usize) -> Self {
        self.stored_baseline = Some(count);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `IngestConfig` or an error if validation fails.
    pub fn build(self) -> Result<IngestConfig, ConfigValidationError> {
        let config = IngestConfig {
            max_file_size_bytes: self
                .max_file_size_bytes
                .unwrap_or(DEFAULT_MAX_FILE_SIZE_BYTES),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            batch_pause_ms: self.batch_pause_ms.unwrap_or(DEFAULT_BATCH_PAUSE_MS),
            toll_free_baseline: self.toll_free_baseline.unwrap_or(0),
            stored_baseline: self.stored_baseline.unwrap_or(0),
        };

        config.validate()?;
        Ok(config)
    }
}
