//! Error types for smt_db

use thiserror::Error;

/// Result type alias for smt_db operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in smt_db operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid hexadecimal parameter: {0}")]
    InvalidHex(String),

    #[error("Key already exists: {0}")]
    KeyExists(String),

    #[error("Key does not exist: {0}")]
    KeyNotFound(String),

    /// The store does not agree with the tree's root
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// A write batch could not be made durable; the root was not advanced
    #[error("Commit failed: {0}")]
    Commit(String),

    /// The hasher produced the reserved zero node
    #[error("Hash function contract violated: {0}")]
    HashContract(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Config error: {0}")]
    Config(String),
}
