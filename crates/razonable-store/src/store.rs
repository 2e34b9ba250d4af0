// ABOUTME: Record store exposing batched get/set/remove with creation and update timestamping.
// ABOUTME: Each batch call runs in one transaction; traversal is delegated to Cursor.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use razonable_core::{Clock, Direction, Index, Record, SystemClock};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::StoreConfig;
use crate::cursor::Cursor;
use crate::engine::{self, Engine, Mode, RECORD_COLUMNS};
use crate::error::StoreError;

/// A key-value store of timestamped records backed by one SQLite connection.
///
/// Cloning a `Store` shares the connection. Payloads are stored as JSON, so
/// any `Serialize` type can be written and read back as any compatible
/// `DeserializeOwned` type (including `serde_json::Value`).
#[derive(Debug, Clone)]
pub struct Store {
    engine: Engine,
    clock: Arc<dyn Clock>,
    page_size: usize,
}

impl Store {
    /// Open or create a file-backed store with default settings.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(StoreConfig::file(path))
    }

    /// Open an in-memory store. Its contents live as long as the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open_with(StoreConfig::memory())
    }

    /// Open a store from explicit configuration.
    pub fn open_with(config: StoreConfig) -> Result<Self, StoreError> {
        if config.page_size == 0 {
            return Err(StoreError::InvalidPageSize);
        }
        let engine = Engine::open(&config)?;
        match engine.path() {
            Some(path) => tracing::info!("opened store at {}", path.display()),
            None => tracing::info!("opened in-memory store"),
        }
        Ok(Self {
            engine,
            clock: Arc::new(SystemClock),
            page_size: config.page_size,
        })
    }

    /// Replace the time source used to stamp writes.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Path of the database file, `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.engine.path()
    }

    /// Default page size handed to cursors created by this store.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total number of records.
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.engine
            .transact("count", Mode::ReadOnly, |tx| {
                let n: i64 = tx.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
                Ok(n as u64)
            })
            .await
    }

    /// Look up one key.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Record<T>>, StoreError> {
        let mut found = self.multi_get::<T, _>(&[key]).await?;
        Ok(found.remove(key).flatten())
    }

    /// Look up every key in one read transaction.
    ///
    /// The result has an entry for each distinct requested key: the stored
    /// record, or `None` when the key is absent. A failure on any key fails
    /// the whole batch.
    pub async fn multi_get<T, K>(&self, keys: &[K]) -> Result<BTreeMap<String, Option<Record<T>>>, StoreError>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let keys: BTreeSet<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();

        let raws = self
            .engine
            .transact("multi_get", Mode::ReadOnly, move |tx| {
                let mut stmt = tx.prepare(&format!("SELECT {RECORD_COLUMNS} FROM records WHERE key = ?1"))?;
                let mut found = BTreeMap::new();
                for key in keys {
                    let raw = stmt.query_row(params![key], engine::read_row).optional()?;
                    found.insert(key, raw);
                }
                Ok(found)
            })
            .await?;

        let mut result = BTreeMap::new();
        for (key, raw) in raws {
            let record = raw.map(engine::decode).transpose()?;
            result.insert(key, record);
        }
        Ok(result)
    }

    /// Write one key and return the stored record.
    pub async fn set<T: Serialize>(&self, key: &str, value: T) -> Result<Record<T>, StoreError> {
        let mut written = self.multi_set([(key, value)]).await?;
        written
            .remove(key)
            .ok_or_else(|| StoreError::NotWritten(key.to_string()))
    }

    /// Write every entry in one read-write transaction.
    ///
    /// For each key the stored record is looked up first. An existing record
    /// keeps its `created` time and is replaced; a new key gets `created`
    /// equal to `updated`. Any failure rolls back the whole batch. When an
    /// entry repeats a key, the last value wins.
    pub async fn multi_set<K, T, I>(&self, entries: I) -> Result<BTreeMap<String, Record<T>>, StoreError>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        let payloads: BTreeMap<String, T> = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let encoded = payloads
            .iter()
            .map(|(key, value)| -> Result<(String, String), StoreError> {
                Ok((key.clone(), serde_json::to_string(value)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let clock = Arc::clone(&self.clock);
        let stamps = self
            .engine
            .transact("multi_set", Mode::ReadWrite, move |tx| {
                let mut lookup = tx.prepare("SELECT created FROM records WHERE key = ?1")?;
                let mut insert = tx.prepare(
                    "INSERT INTO records (key, created, updated, payload) VALUES (?1, ?2, ?3, ?4)",
                )?;
                let mut replace = tx.prepare(
                    "UPDATE records SET created = ?2, updated = ?3, payload = ?4 WHERE key = ?1",
                )?;

                let mut stamps = BTreeMap::new();
                for (key, payload) in encoded {
                    let existing: Option<i64> = lookup.query_row(params![key], |row| row.get(0)).optional()?;
                    let stamped = Record::stamp(key, payload, clock.now_millis(), existing);

                    let statement = if existing.is_some() { &mut replace } else { &mut insert };
                    statement.execute(params![stamped.key, stamped.created, stamped.updated, stamped.payload])?;

                    stamps.insert(stamped.key, (stamped.created, stamped.updated));
                }
                Ok(stamps)
            })
            .await?;

        let mut written = BTreeMap::new();
        for (key, payload) in payloads {
            if let Some(&(created, updated)) = stamps.get(&key) {
                written.insert(
                    key.clone(),
                    Record {
                        key,
                        created,
                        updated,
                        payload,
                    },
                );
            }
        }
        Ok(written)
    }

    /// Delete one key. Returns whether a record was removed.
    pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.multi_remove(&[key]).await? > 0)
    }

    /// Delete every key in one read-write transaction.
    ///
    /// Missing keys are not an error. Returns the number of records removed.
    pub async fn multi_remove<K: AsRef<str>>(&self, keys: &[K]) -> Result<usize, StoreError> {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();

        self.engine
            .transact("multi_remove", Mode::ReadWrite, move |tx| {
                let mut stmt = tx.prepare("DELETE FROM records WHERE key = ?1")?;
                let mut removed = 0;
                for key in keys {
                    removed += stmt.execute(params![key])?;
                }
                Ok(removed)
            })
            .await
    }

    /// Every primary key in ascending order, read in one full scan.
    pub async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.engine
            .transact("keys", Mode::ReadOnly, |tx| {
                let mut stmt = tx.prepare("SELECT key FROM records ORDER BY key ASC")?;
                let keys = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
    }

    /// Delete every record. Returns the number removed.
    pub async fn clear(&self) -> Result<usize, StoreError> {
        self.engine
            .transact("clear", Mode::ReadWrite, |tx| Ok(tx.execute("DELETE FROM records", [])?))
            .await
    }

    /// Close the connection and delete the database files.
    ///
    /// Other clones of this store fail on their next operation.
    pub async fn destroy(self) -> Result<(), StoreError> {
        tracing::info!("destroying store");
        self.engine.destroy().await
    }

    /// A fresh cursor over the primary key, ascending.
    pub fn cursor<T>(&self) -> Cursor<T> {
        Cursor::new(self.engine.clone(), None, Direction::Forward, self.page_size)
    }

    /// A fresh cursor over `index` in `direction`.
    pub fn cursor_with_index<T>(&self, index: Index, direction: Direction) -> Cursor<T> {
        Cursor::new(self.engine.clone(), Some(index), direction, self.page_size)
    }

    /// Rebuild a cursor from [`Cursor::save`] output. `index` must be the one
    /// the saved cursor was walking (`None` for the primary key).
    pub fn restore_cursor<T>(&self, saved: &str, index: Option<Index>) -> Result<Cursor<T>, StoreError> {
        let mut cursor = Cursor::new(self.engine.clone(), index, Direction::Forward, self.page_size);
        cursor.load(saved)?;
        Ok(cursor)
    }

    /// Drain `cursor` (or a fresh primary-key cursor) to the end, calling
    /// `callback` on every record in page order.
    ///
    /// Control returns to the scheduler between pages. Returns the number of
    /// records visited.
    pub async fn for_each<T, F>(&self, callback: F, cursor: Option<Cursor<T>>) -> Result<usize, StoreError>
    where
        T: DeserializeOwned,
        F: FnMut(Record<T>),
    {
        self.drain(callback, cursor, None).await
    }

    /// Like [`Store::for_each`], but stops at the next page boundary once
    /// `cancel` fires.
    pub async fn for_each_until<T, F>(
        &self,
        callback: F,
        cursor: Option<Cursor<T>>,
        cancel: &CancellationToken,
    ) -> Result<usize, StoreError>
    where
        T: DeserializeOwned,
        F: FnMut(Record<T>),
    {
        self.drain(callback, cursor, Some(cancel)).await
    }

    async fn drain<T, F>(
        &self,
        mut callback: F,
        cursor: Option<Cursor<T>>,
        cancel: Option<&CancellationToken>,
    ) -> Result<usize, StoreError>
    where
        T: DeserializeOwned,
        F: FnMut(Record<T>),
    {
        let mut cursor = cursor.unwrap_or_else(|| self.cursor());
        let mut visited = 0;

        loop {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                tracing::debug!("traversal cancelled after {} records", visited);
                break;
            }

            let page = cursor.next().await?;
            visited += page.len();
            page.into_iter().for_each(&mut callback);

            if !cursor.has_more() {
                break;
            }
            tokio::task::yield_now().await;
        }

        Ok(visited)
    }
}
