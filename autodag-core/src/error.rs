//! Error types for autodag
//!
//! Every failure is tagged by the stage that produced it, so callers can tell
//! a bad configuration apart from a corrupt block or a storage miss.

use cid::Cid;
use thiserror::Error;

/// Result type alias for autodag operations
pub type Result<T> = std::result::Result<T, AutoDagError>;

/// Unified error type for autodag
#[derive(Error, Debug)]
pub enum AutoDagError {
    // ===== Configuration Errors =====
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ===== Codec Errors =====
    #[error("Malformed node: {0}")]
    MalformedNode(String),

    #[error("Missing payload: {0}")]
    MissingPayload(String),

    // ===== Addressing Errors =====
    #[error("Invalid CID: {0}")]
    CidParse(String),

    #[error("Hash collision: different bytes stored under {0}")]
    HashCollision(Cid),

    // ===== Transform Errors =====
    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ===== Storage Errors =====
    #[error("Block not found: {0}")]
    NotFound(Cid),

    #[error("Storage full: {used} / {capacity} bytes")]
    StorageFull { used: u64, capacity: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    // ===== Pipeline Errors =====
    #[error("Operation cancelled")]
    Cancelled,

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<prost::DecodeError> for AutoDagError {
    fn from(err: prost::DecodeError) -> Self {
        AutoDagError::MalformedNode(err.to_string())
    }
}

impl From<cid::Error> for AutoDagError {
    fn from(err: cid::Error) -> Self {
        AutoDagError::CidParse(err.to_string())
    }
}

impl From<serde_json::Error> for AutoDagError {
    fn from(err: serde_json::Error) -> Self {
        AutoDagError::Serialization(err.to_string())
    }
}
