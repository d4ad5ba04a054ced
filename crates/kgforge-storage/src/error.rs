//! Error types for graph storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// An operation was issued before `connect` or after `disconnect`.
    #[error("storage backend is not connected")]
    NotConnected,

    #[error("graph {graph_id} not found")]
    NotFound { graph_id: String },

    /// Graph ids name files on disk; path separators and dot segments are refused.
    #[error("invalid graph id `{0}`")]
    InvalidGraphId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("atomic replace failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("schema migration failed: {0}")]
    Schema(String),

    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// The three failure classes callers distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotConnected,
    NotFound,
    Backend,
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotConnected => ErrorKind::NotConnected,
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Backend,
        }
    }

    pub(crate) fn not_found(graph_id: &str) -> Self {
        StorageError::NotFound {
            graph_id: graph_id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
