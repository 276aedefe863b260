//! Top-level simulation errors.

use super::error_code::{self, KeystoneErrorCode};
use super::{ConfigError, DataError, StorageError};

/// Errors that can occur during a simulation run.
/// Aggregates subsystem errors via `From` conversions.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker for candidate chunk [{chunk_start}, {chunk_end}) failed: {message}")]
    Worker {
        chunk_start: usize,
        chunk_end: usize,
        message: String,
    },

    #[error("Simulation cancelled")]
    Cancelled,
}

impl KeystoneErrorCode for SimulationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Data(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
            Self::Worker { .. } => error_code::WORKER_ERROR,
            Self::Cancelled => error_code::CANCELLED,
        }
    }
}
