//! Error types for embedding training and persistence

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The graph has no relations to learn from.
    #[error("graph has no relations to train on")]
    EmptyGraph,

    #[error("invalid hyperparameter `{name}`: {reason}")]
    InvalidHyperparameter { name: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to CBOR-encode embeddings: {0}")]
    Encode(String),

    #[error("failed to CBOR-decode embeddings: {0}")]
    Decode(String),

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> EmbeddingError {
    EmbeddingError::InvalidHyperparameter {
        name,
        reason: reason.into(),
    }
}

pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("must be a positive finite number, got {value}")))
    }
}

pub(crate) fn require_nonzero(name: &'static str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(invalid(name, "must be at least 1"))
    }
}
