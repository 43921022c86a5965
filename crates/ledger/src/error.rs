//! Error types for the ledger crate

use thiserror::Error;

/// Errors that can occur during state store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record body could not be encoded or decoded
    #[error("corrupt record body: {0}")]
    Json(#[from] serde_json::Error),

    /// The database was written by a newer version
    #[error("unsupported state schema version {found} (this build reads up to {supported})")]
    UnsupportedSchema { found: i64, supported: i64 },

    /// A record was written in a newer layout
    #[error("record `{name}` has unsupported format {format}")]
    UnsupportedRecord { name: String, format: u32 },

    /// Another writer moved the revision on
    #[error("revision conflict (expected {expected}, found {found})")]
    Conflict { expected: u64, found: u64 },
}

impl From<Error> for converge::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Conflict { expected, found } => Self::ConcurrentModification { expected, found },
            other => Self::State(other.to_string()),
        }
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;
