//! Runtime configuration.
//!
//! Everything here has a sensible default and can be overridden through
//! environment variables, so the same build runs unchanged in dev and
//! production. Invalid overrides are hard errors rather than silent
//! fallbacks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::manifest::HeaderMatching;
use crate::orchestrator::Pacing;

/// Upper bound on accepted manifest rows per batch.
pub const DEFAULT_MAX_CERTIFICATES: usize = 250;

/// Certificates per estimation sub-batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Estimated processing minutes per certificate.
pub const DEFAULT_MINUTES_PER_CERTIFICATE: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Maximum accepted manifest rows per batch.
    pub max_certificates_per_batch: usize,
    /// Chunk size for the batch-breakdown estimate.
    pub processing_batch_size: usize,
    /// Per-certificate estimate used for processing-time projections.
    pub minutes_per_certificate: f64,
    /// Base URL embedded in verification QR codes.
    pub verification_base_url: String,
    /// Delay strategy between certificates in the drain loop.
    pub pacing: Pacing,
    /// Delay before a retried/reissued certificate is reprocessed.
    pub retry_delay_ms: u64,
    /// Manifest header matching mode.
    pub header_matching: HeaderMatching,
    /// Root directory for stored archives, sources and issued PDFs.
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_certificates_per_batch: DEFAULT_MAX_CERTIFICATES,
            processing_batch_size: DEFAULT_BATCH_SIZE,
            minutes_per_certificate: DEFAULT_MINUTES_PER_CERTIFICATE,
            verification_base_url: "http://localhost:5000".to_string(),
            pacing: Pacing::default(),
            retry_delay_ms: 1000,
            header_matching: HeaderMatching::default(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    /// Builds a config from defaults plus `CERTSTAMP_*` environment
    /// overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_var("CERTSTAMP_MAX_CERTIFICATES") {
            config.max_certificates_per_batch =
                parse_env("CERTSTAMP_MAX_CERTIFICATES", &v, "a positive integer")?;
        }
        if let Some(v) = env_var("CERTSTAMP_BATCH_SIZE") {
            config.processing_batch_size =
                parse_env("CERTSTAMP_BATCH_SIZE", &v, "a positive integer")?;
        }
        if let Some(v) = env_var("CERTSTAMP_MINUTES_PER_CERTIFICATE") {
            config.minutes_per_certificate =
                parse_env("CERTSTAMP_MINUTES_PER_CERTIFICATE", &v, "a number of minutes")?;
        }
        if let Some(v) = env_var("CERTSTAMP_BASE_URL") {
            config.verification_base_url = v;
        }
        if let Some(v) = env_var("CERTSTAMP_PACING") {
            config.pacing = v.parse().map_err(|reason| ConfigError::InvalidValue {
                variable: "CERTSTAMP_PACING".to_string(),
                value: v.clone(),
                reason,
            })?;
        }
        if let Some(v) = env_var("CERTSTAMP_RETRY_DELAY_MS") {
            config.retry_delay_ms =
                parse_env("CERTSTAMP_RETRY_DELAY_MS", &v, "a delay in milliseconds")?;
        }
        if let Some(v) = env_var("CERTSTAMP_HEADER_MATCHING") {
            config.header_matching = v.parse().map_err(|reason| ConfigError::InvalidValue {
                variable: "CERTSTAMP_HEADER_MATCHING".to_string(),
                value: v.clone(),
                reason,
            })?;
        }
        if let Some(v) = env_var("CERTSTAMP_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_certificates_per_batch == 0 {
            return Err(ConfigError::Validation {
                message: "max_certificates_per_batch must be at least 1".to_string(),
            });
        }
        if self.processing_batch_size == 0 {
            return Err(ConfigError::Validation {
                message: "processing_batch_size must be at least 1".to_string(),
            });
        }
        if !self.minutes_per_certificate.is_finite() || self.minutes_per_certificate < 0.0 {
            return Err(ConfigError::Validation {
                message: "minutes_per_certificate must be a non-negative number".to_string(),
            });
        }
        if self.verification_base_url.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "verification_base_url must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(
    variable: &str,
    value: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        variable: variable.to_string(),
        value: value.to_string(),
        reason: format!("expected {}", expected),
    })
}
