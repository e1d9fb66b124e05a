//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its persistence layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache constructed with a non-positive capacity
    #[error("Invalid capacity: {0} (must be at least 1)")]
    InvalidCapacity(usize),

    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Log or snapshot file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes failed the cipher's format or padding checks
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Log record cut short by a crash mid-write
    #[error("Truncated record at byte offset {0}")]
    TruncatedRecord(u64),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
