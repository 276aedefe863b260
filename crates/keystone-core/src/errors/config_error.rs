//! Configuration errors.

use super::error_code::{self, KeystoneErrorCode};

/// Errors raised while validating or loading engine configuration.
///
/// All of these fail fast at construction time, before any matrix work.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown aggregation law: {0}")]
    UnknownLaw(String),

    #[error("Invalid exponent {name}={value}: must be finite and > 0")]
    InvalidExponent { name: &'static str, value: f64 },

    #[error("Invalid iteration cap: must be >= 1")]
    InvalidIterMax,

    #[error("Invalid group size: must be >= 1")]
    InvalidGroupSize,

    #[error("Failed to read config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

impl KeystoneErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        error_code::CONFIG_ERROR
    }
}
