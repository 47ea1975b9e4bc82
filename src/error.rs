//! Error types for the ledger engine

use std::fmt;

#[derive(Debug)]
pub enum ChainError {
    /// A requested block, transaction, output or input is absent.
    NotFound(&'static str, String),
    DatabaseError(String),
    CryptoError(String),
    ConfigError(String),
    SerializationError(String),
    IoError(String),
    InternalError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::NotFound(kind, id) => write!(f, "{} {} not found", kind, id),
            ChainError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ChainError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            ChainError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            ChainError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
            ChainError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
