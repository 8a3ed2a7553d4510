//! Error types for Memoria

use thiserror::Error;

use crate::model::SessionStatus;

/// Main error type for Memoria operations
#[derive(Error, Debug)]
pub enum MemoriaError {
    /// Relational tier errors (connection, query, transaction)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage transport or auth failure (anything except not-found,
    /// which is always an `Option`/empty result, never an error)
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Malformed payload (undecodable profile JSON, invalid triple line,
    /// corrupt archive document)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Fatal setup errors (missing database URL, unusable endpoint)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session status state-machine violation
    #[error("Invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Embedding vector with the wrong dimension
    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidEmbeddingDimension { expected: usize, actual: usize },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Memoria operations
pub type Result<T> = std::result::Result<T, MemoriaError>;
