// ABOUTME: Defines the Record envelope wrapping a caller payload with its key and timestamps.
// ABOUTME: Encodes the write-once creation time and per-write update time rules.

use serde::{Deserialize, Serialize};

/// A stored value together with its identity and bookkeeping timestamps.
///
/// Timestamps are milliseconds since the Unix epoch. `created` is written
/// once, when the key is first stored; `updated` changes on every write,
/// so `created <= updated` holds for every record produced by [`Record::stamp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<T> {
    pub key: String,
    pub created: i64,
    pub updated: i64,
    pub payload: T,
}

impl<T> Record<T> {
    /// Build the record for a write of `payload` under `key` at time `now`.
    ///
    /// `existing_created` is the creation time of the record currently stored
    /// under `key`, if any. When present it is carried forward; otherwise the
    /// write is a creation and `created` equals `updated`.
    pub fn stamp(key: impl Into<String>, payload: T, now: i64, existing_created: Option<i64>) -> Self {
        Self {
            key: key.into(),
            created: existing_created.unwrap_or(now),
            updated: now,
            payload,
        }
    }

    /// True when this record has never been rewritten since creation.
    pub fn is_pristine(&self) -> bool {
        self.created == self.updated
    }

    /// Replace the payload, keeping key and timestamps.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Record<U> {
        Record {
            key: self.key,
            created: self.created,
            updated: self.updated,
            payload: f(self.payload),
        }
    }
}
