//! Error types for vleaf

use thiserror::Error;

/// Result type alias for vleaf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vleaf operations
///
/// Lookups of absent paths or keys are not errors; they come back as
/// `None` / `false`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Single-writer discipline violated: {0}")]
    ConcurrencyViolation(String),

    #[error("Store is closed")]
    Closed,

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid data file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Errors after which the backing store can no longer be trusted.
    ///
    /// The enclosing node is expected to halt or restart on these.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConcurrencyViolation(_) | Error::Corruption(_)
        )
    }
}
