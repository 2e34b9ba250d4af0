// ABOUTME: Persistence layer for razonable: timestamped records on SQLite with resumable cursors.
// ABOUTME: Provides the Store for batched access, Cursor for paged traversal, and StoreConfig.

pub mod config;
pub mod cursor;
mod engine;
pub mod error;
pub mod store;

pub use config::{ConfigError, DEFAULT_PAGE_SIZE, Location, StoreConfig};
pub use cursor::Cursor;
pub use engine::SCHEMA_VERSION;
pub use error::StoreError;
pub use store::Store;

pub use razonable_core::{Clock, Direction, Index, ManualClock, Record, SystemClock};
pub use tokio_util::sync::CancellationToken;
