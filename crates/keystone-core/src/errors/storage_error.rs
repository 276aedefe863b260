//! Storage errors.

use super::error_code::{self, KeystoneErrorCode};

/// Errors raised by the SQLite result cache.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("Serialization error: {message}")]
    SerializationError { message: String },
}

impl KeystoneErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        error_code::STORAGE_ERROR
    }
}
