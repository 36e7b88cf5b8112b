//! Pipeline configuration.
//!
//! [`PipelineConfig`] is built with `with_*` methods on top of defaults, or
//! read from `ROW_GUARD_*` environment variables with [`PipelineConfig::from_env`].
//!
//! ```rust
//! use row_guard::config::PipelineConfig;
//! use std::time::Duration;
//!
//! let config = PipelineConfig::new()
//!     .with_chunk_size(1000)
//!     .with_workers(8)
//!     .with_url_ttl(Duration::from_secs(600));
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{GuardError, Result};
use crate::logging::LogConfig;
use crate::validation::{DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BUCKET: &str = "row-guard";
pub const DEFAULT_INPUT_PREFIX: &str = "uploads";
pub const DEFAULT_OUTPUT_PREFIX: &str = "validated";
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(1800);

pub const ENV_BUCKET: &str = "ROW_GUARD_BUCKET";
pub const ENV_INPUT_PREFIX: &str = "ROW_GUARD_INPUT_PREFIX";
pub const ENV_OUTPUT_PREFIX: &str = "ROW_GUARD_OUTPUT_PREFIX";
pub const ENV_CHUNK_SIZE: &str = "ROW_GUARD_CHUNK_SIZE";
pub const ENV_WORKERS: &str = "ROW_GUARD_WORKERS";
pub const ENV_URL_TTL_SECS: &str = "ROW_GUARD_URL_TTL_SECS";

/// Settings for one [`ValidationPipeline`](crate::pipeline::ValidationPipeline).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rows per chunk
    pub chunk_size: usize,
    /// Chunks validated concurrently per batch
    pub workers: usize,
    /// Bucket holding uploads and artifacts
    pub bucket: String,
    /// Key prefix for ingested uploads
    pub input_prefix: String,
    /// Key prefix for result artifacts
    pub output_prefix: String,
    /// Lifetime of signed artifact URLs
    pub url_ttl: Duration,
    pub log_config: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            bucket: DEFAULT_BUCKET.to_string(),
            input_prefix: DEFAULT_INPUT_PREFIX.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            url_ttl: DEFAULT_URL_TTL,
            log_config: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_input_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.input_prefix = normalize_prefix(prefix.into());
        self
    }

    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = normalize_prefix(prefix.into());
        self
    }

    pub fn with_url_ttl(mut self, ttl: Duration) -> Self {
        self.url_ttl = ttl;
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Reads overrides from the `ROW_GUARD_*` environment variables.
    ///
    /// Unset variables keep their defaults. The result is validated.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(bucket) = lookup(ENV_BUCKET) {
            config = config.with_bucket(bucket);
        }
        if let Some(prefix) = lookup(ENV_INPUT_PREFIX) {
            config = config.with_input_prefix(prefix);
        }
        if let Some(prefix) = lookup(ENV_OUTPUT_PREFIX) {
            config = config.with_output_prefix(prefix);
        }
        if let Some(raw) = lookup(ENV_CHUNK_SIZE) {
            config.chunk_size = parse_var(ENV_CHUNK_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_WORKERS) {
            config.workers = parse_var(ENV_WORKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_URL_TTL_SECS) {
            config.url_ttl = Duration::from_secs(parse_var(ENV_URL_TTL_SECS, &raw)?);
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks that the settings can drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(GuardError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(GuardError::Configuration(
                "workers must be greater than zero".to_string(),
            ));
        }
        if self.bucket.trim().is_empty() {
            return Err(GuardError::Configuration("bucket must not be empty".to_string()));
        }
        if self.url_ttl.is_zero() {
            return Err(GuardError::Configuration(
                "url_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn normalize_prefix(prefix: String) -> String {
    prefix.trim_matches('/').to_string()
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| GuardError::Configuration(format!("invalid {name}={raw:?}: {e}")))
}
