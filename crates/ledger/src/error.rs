//! Error types for the ledger crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading, writing or locking the ledger
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem error, tagged with what was being attempted
    #[error("failed to {context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ledger file is not valid JSON for any known schema
    #[error("failed to parse ledger {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize the ledger
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Ledger written by a newer version of the tool
    #[error("ledger schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },

    /// Another process holds a fresh lock
    #[error("ledger is locked by another process ({} held for {age_secs}s)", .path.display())]
    LockHeld { path: PathBuf, age_secs: i64 },

    /// This handle already holds the lock
    #[error("lock already held by this process")]
    AlreadyHeld,

    /// No record with that name
    #[error("resource not found in state: {0}")]
    ResourceNotFound(String),
}

impl Error {
    pub(crate) fn io(context: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;
