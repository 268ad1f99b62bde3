//! Error types for resonance-db.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for resonance-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in resonance-db operations.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // ANN index errors
    // ========================================================================
    /// Index file I/O error.
    #[error("Vector index I/O error at {path}: {message}")]
    VectorIo { path: PathBuf, message: String },

    /// Index file could not be decoded or failed validation.
    #[error("Vector index parse error at {path}: {message}")]
    VectorParse { path: PathBuf, message: String },

    /// Vector dimension mismatch.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// No persisted index at the given path.
    #[error("Vector index not found at {path}")]
    IndexNotFound { path: PathBuf },

    /// The requested item is not present in the index.
    #[error("Item {id} is not present in the index")]
    ItemNotFound { id: u32 },

    /// The index was already built and cannot be built or extended again.
    #[error("Vector index is already built")]
    AlreadyBuilt,

    /// The index has not been built yet and cannot be searched or saved.
    #[error("Vector index has not been built")]
    NotBuilt,

    // ========================================================================
    // Feature store errors
    // ========================================================================
    /// A stored feature vector is not a numeric array.
    #[error("Malformed feature vector for id {id}: {reason}")]
    MalformedVector { id: u32, reason: String },

    /// Relational store error.
    #[error("Feature store error: {message}")]
    Store { message: String },

    // ========================================================================
    // General errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a vector I/O error.
    pub fn vector_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::VectorIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a vector parse error.
    pub fn vector_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::VectorParse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a malformed vector error.
    pub fn malformed_vector(id: u32, reason: impl Into<String>) -> Self {
        Self::MalformedVector {
            id,
            reason: reason.into(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }
}
