//! error types for field and commitment primitives

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("invalid decimal field element: {0}")]
    InvalidDecimal(String),

    #[error("value not reduced mod p: {0}")]
    NotReduced(String),

    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("polynomial degree {degree} exceeds srs max degree {max}")]
    DegreeTooLarge { degree: usize, max: usize },

    #[error("srs error: {0}")]
    Srs(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ark_serialize::SerializationError> for FieldError {
    fn from(e: ark_serialize::SerializationError) -> Self {
        FieldError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for FieldError {
    fn from(e: serde_json::Error) -> Self {
        FieldError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FieldError>;
