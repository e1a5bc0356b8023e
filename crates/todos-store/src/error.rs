// ABOUTME: Error taxonomy shared by every storage backend.
// ABOUTME: Separates caller mistakes (validation) from medium failures (io, json, sqlite).

use thiserror::Error;
use todos_core::ValidationError;

use crate::codec::CodecError;

/// Errors that can occur in any storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("store used before init()")]
    NotInitialized,

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// True for failures of the underlying medium rather than of the caller's input.
    pub fn is_medium(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Json(_) | Self::Sqlite(_) | Self::Task(_) | Self::Poisoned
        )
    }

    /// True when the SQLite engine gave up waiting on a lock.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
