// ABOUTME: Cursor vocabulary shared by the store: direction, ordering index, and resume position.
// ABOUTME: Also defines the portable saved-cursor form and its JSON save/load codec.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::Record;

/// Errors raised while parsing cursor names or restoring a saved cursor.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("malformed saved cursor: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown index: {0}")]
    UnknownIndex(String),

    #[error("unknown direction: {0}")]
    UnknownDirection(String),

    #[error("saved position does not fit the {0} ordering")]
    PositionMismatch(Index),
}

/// Traversal direction, fixed when a cursor is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Direction::Forward),
            "reverse" => Ok(Direction::Reverse),
            other => Err(CursorError::UnknownDirection(other.to_string())),
        }
    }
}

/// An ordering a cursor can walk. `Key` is the primary key; the others are
/// the secondary orderings by creation and update time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    Key,
    Created,
    Updated,
}

impl Index {
    pub fn as_str(&self) -> &'static str {
        match self {
            Index::Key => "key",
            Index::Created => "created",
            Index::Updated => "updated",
        }
    }

    /// The ordering-key value of `record` under this index.
    pub fn value_of<T>(&self, record: &Record<T>) -> OrderValue {
        match self {
            Index::Key => OrderValue::Text(record.key.clone()),
            Index::Created => OrderValue::Int(record.created),
            Index::Updated => OrderValue::Int(record.updated),
        }
    }

    /// Whether two records can share the same ordering-key value.
    pub fn is_unique(&self) -> bool {
        matches!(self, Index::Key)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Index {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "key" => Ok(Index::Key),
            "created" => Ok(Index::Created),
            "updated" => Ok(Index::Updated),
            other => Err(CursorError::UnknownIndex(other.to_string())),
        }
    }
}

/// A value of an ordering key: a primary key string or a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderValue {
    Int(i64),
    Text(String),
}

/// Where a cursor stopped: the ordering-key value of the last record it
/// returned, plus that record's primary key to break ties on non-unique
/// orderings. `key` is `None` only for positions restored from a saved
/// cursor that did not carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub value: OrderValue,
    pub key: Option<String>,
}

impl ResumePoint {
    pub fn of<T>(record: &Record<T>, index: Index) -> Self {
        Self {
            value: index.value_of(record),
            key: Some(record.key.clone()),
        }
    }

    /// Check that this position can bound a scan over `index`: text values
    /// for the primary key, integers for the timestamp orderings.
    pub fn check(&self, index: Index) -> Result<(), CursorError> {
        match (&self.value, index) {
            (OrderValue::Text(_), Index::Key) => Ok(()),
            (OrderValue::Int(_), Index::Created | Index::Updated) => Ok(()),
            _ => Err(CursorError::PositionMismatch(index)),
        }
    }
}

/// The portable part of a cursor: position and direction.
///
/// The index a cursor walks and its `has_more` flag are not part of the
/// saved form, so restoring a secondary-ordered cursor requires the caller
/// to name the index again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCursor {
    pub last_key_value: Option<OrderValue>,
    #[serde(default)]
    pub last_key: Option<String>,
    pub direction: Direction,
}

impl SavedCursor {
    pub fn new(position: Option<&ResumePoint>, direction: Direction) -> Self {
        Self {
            last_key_value: position.map(|p| p.value.clone()),
            last_key: position.and_then(|p| p.key.clone()),
            direction,
        }
    }

    /// The resume point encoded in this saved cursor, if enumeration had started.
    pub fn position(&self) -> Option<ResumePoint> {
        self.last_key_value.clone().map(|value| ResumePoint {
            value,
            key: self.last_key.clone(),
        })
    }

    /// Serialize to the textual form handed to callers.
    pub fn save(&self) -> String {
        // Only strings, integers, and a unit enum: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse the textual form produced by [`SavedCursor::save`].
    pub fn load(text: &str) -> Result<Self, CursorError> {
        Ok(serde_json::from_str(text)?)
    }
}
