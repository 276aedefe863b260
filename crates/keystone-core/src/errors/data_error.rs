//! Data-integrity errors.

use super::error_code::{self, KeystoneErrorCode};

/// Errors raised when the input matrices disagree with each other.
///
/// A mismatch means the caller mixed artifacts from different time windows
/// or rank indices; silently broadcasting would corrupt every downstream
/// ranking, so these are always fatal.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Shape mismatch: {context} expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Rank {rank} out of bounds for {kind} index of size {size}")]
    RankOutOfBounds {
        kind: &'static str,
        rank: usize,
        size: usize,
    },

    #[error("Duplicate identifier in rank index")]
    DuplicateId,

    #[error("Negative entry at ({row}, {col}): contribution and dependency weights must be non-negative")]
    NegativeEntry { row: usize, col: usize },

    #[error("Negative weight {value} for repository rank {rank}: popularity weights must be non-negative")]
    NegativeWeight { rank: usize, value: f64 },
}

impl KeystoneErrorCode for DataError {
    fn error_code(&self) -> &'static str {
        error_code::DATA_ERROR
    }
}
