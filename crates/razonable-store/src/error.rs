// ABOUTME: Error type for every store, cursor, and engine operation.
// ABOUTME: Wraps SQLite, JSON, I/O, cursor, and configuration failures.

use razonable_core::CursorError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("unsupported schema version {0}")]
    SchemaVersion(i64),

    #[error("write of {0} was not recorded")]
    NotWritten(String),

    #[error("page size must be a positive integer")]
    InvalidPageSize,

    #[error("storage task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Join(e.to_string())
    }
}
