// ABOUTME: Configuration loading and validation for opening a record store.
// ABOUTME: Reads RAZONABLE_* environment variables and applies defaults for path, page size, and timeouts.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default number of records returned by one cursor page.
pub const DEFAULT_PAGE_SIZE: usize = 2500;

/// Default time SQLite waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RAZONABLE_PAGE_SIZE must be a positive integer, got {0:?}")]
    InvalidPageSize(String),

    #[error("RAZONABLE_BUSY_TIMEOUT_MS must be a non-negative integer, got {0:?}")]
    InvalidBusyTimeout(String),
}

/// Where a store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Memory,
}

/// Settings used when opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub location: Location,
    pub page_size: usize,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    /// A file-backed store at `path` with default settings.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            page_size: DEFAULT_PAGE_SIZE,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// An in-memory store with default settings. Its contents vanish when
    /// the last handle is dropped.
    pub fn memory() -> Self {
        Self {
            location: Location::Memory,
            page_size: DEFAULT_PAGE_SIZE,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - RAZONABLE_HOME: data directory (default: ~/.razonable)
    /// - RAZONABLE_DB: database file, relative to home unless absolute (default: records.db)
    /// - RAZONABLE_PAGE_SIZE: default cursor page size (default: 2500)
    /// - RAZONABLE_BUSY_TIMEOUT_MS: SQLite busy timeout in milliseconds (default: 5000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = std::env::var("RAZONABLE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/tmp"))
                    .join(".razonable")
            });

        let db = std::env::var("RAZONABLE_DB")
            .ok()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "records.db".to_string());
        // join() keeps an absolute db path as-is
        let path = home.join(db);

        let page_size = match std::env::var("RAZONABLE_PAGE_SIZE") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidPageSize(raw)),
            },
            Err(_) => DEFAULT_PAGE_SIZE,
        };

        let busy_timeout = match std::env::var("RAZONABLE_BUSY_TIMEOUT_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidBusyTimeout(raw))?,
            Err(_) => DEFAULT_BUSY_TIMEOUT,
        };

        Ok(Self {
            location: Location::File(path),
            page_size,
            busy_timeout,
        })
    }
}
