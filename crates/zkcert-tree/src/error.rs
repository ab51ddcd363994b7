//! error types for commitment trees

use thiserror::Error;
use zkcert_field::FieldError;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("node out of bounds: level {level}, index {index}")]
    OutOfBounds { level: usize, index: u64 },

    #[error("leaf batch length mismatch: {values} values, {indices} indices")]
    LengthMismatch { values: usize, indices: usize },

    #[error("tree full: all {capacity} leaves are occupied")]
    TreeFull { capacity: u64 },

    #[error("invalid tree shape: {0}")]
    InvalidShape(String),

    #[error("hash error: {0}")]
    Hash(String),

    #[error("field error: {0}")]
    Field(#[from] FieldError),
}

pub type Result<T> = std::result::Result<T, TreeError>;
