// ABOUTME: SQLite engine owning the single connection a store shares across every operation.
// ABOUTME: Creates the version 1 schema and runs scoped read/write transactions on the blocking pool.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use razonable_core::Record;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;

use crate::config::{Location, StoreConfig};
use crate::error::StoreError;

/// Schema version written to `PRAGMA user_version` once the tables exist.
pub const SCHEMA_VERSION: i64 = 1;

/// Column list selected by every query that materializes a record.
pub(crate) const RECORD_COLUMNS: &str = "key, created, updated, payload";

/// A record as stored: the payload is still JSON text.
pub(crate) type RawRecord = Record<String>;

/// Transaction mode for a scoped unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    ReadOnly,
    ReadWrite,
}

/// Shared handle to the store's database connection.
///
/// Cloning is cheap; every clone talks to the same connection, and the
/// connection mutex serializes transactions issued through any of them.
#[derive(Debug, Clone)]
pub(crate) struct Engine {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Engine {
    /// Open the database described by `config`, creating the schema on first use.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let (mut conn, path) = match &config.location {
            Location::File(path) => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(path)?;
                conn.execute_batch("PRAGMA journal_mode=WAL;")?;
                (conn, Some(path.clone()))
            }
            Location::Memory => (Connection::open_in_memory()?, None),
        };
        conn.busy_timeout(config.busy_timeout)?;

        ensure_schema(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Path of the database file, or `None` for an in-memory database.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `work` inside one transaction on the blocking pool.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back when it
    /// returns `Err` or panics. Failures are logged under `op` before being
    /// returned to the caller.
    pub async fn transact<F, R>(&self, op: &'static str, mode: Mode, work: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        let result = tokio::task::spawn_blocking(move || -> Result<R, StoreError> {
            let mut conn = conn.lock();
            let behavior = match mode {
                Mode::ReadOnly => TransactionBehavior::Deferred,
                Mode::ReadWrite => TransactionBehavior::Immediate,
            };
            let tx = conn.transaction_with_behavior(behavior)?;
            let value = work(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
        .map_err(StoreError::from)
        .and_then(|r| r);

        match &result {
            Ok(_) => tracing::debug!("{} committed", op),
            Err(e) => tracing::error!("{} failed: {}", op, e),
        }

        result
    }

    /// Close the connection and delete the database files.
    ///
    /// The shared connection is swapped for an empty in-memory one, so any
    /// handle still holding this engine fails cleanly afterwards instead of
    /// recreating the file.
    pub async fn destroy(&self) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut guard = conn.lock();
            let old = std::mem::replace(&mut *guard, Connection::open_in_memory()?);
            old.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            drop(guard);

            if let Some(path) = path {
                for file in database_files(&path) {
                    match fs::remove_file(&file) {
                        Ok(()) => tracing::info!("removed {}", file.display()),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(StoreError::Io(e)),
                    }
                }
            }
            Ok(())
        })
        .await?
    }
}

/// Create the records table and its orderings exactly once.
fn ensure_schema(conn: &mut Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    match version {
        SCHEMA_VERSION => {
            tracing::debug!("schema already at version {}", version);
            Ok(())
        }
        0 => {
            tracing::info!("creating schema version {}", SCHEMA_VERSION);
            let tx = conn.transaction()?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS records (
                    key TEXT PRIMARY KEY,
                    created INTEGER NOT NULL,
                    updated INTEGER NOT NULL,
                    payload TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_records_created ON records(created, key);
                CREATE INDEX IF NOT EXISTS idx_records_updated ON records(updated, key);",
            )?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            Ok(())
        }
        other => Err(StoreError::SchemaVersion(other)),
    }
}

/// The database file plus the WAL and shared-memory files SQLite keeps beside it.
fn database_files(path: &Path) -> Vec<PathBuf> {
    let mut files = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

/// Map a row selected with [`RECORD_COLUMNS`] to a raw record.
pub(crate) fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(Record {
        key: row.get(0)?,
        created: row.get(1)?,
        updated: row.get(2)?,
        payload: row.get(3)?,
    })
}

/// Parse a raw record's JSON payload into the caller's type.
pub(crate) fn decode<T: DeserializeOwned>(raw: RawRecord) -> Result<Record<T>, StoreError> {
    let payload = serde_json::from_str(&raw.payload)?;
    Ok(raw.map(|_| payload))
}
