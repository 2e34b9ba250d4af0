// ABOUTME: Resumable, ordered cursor over the records table, by primary key or a timestamp index.
// ABOUTME: Yields bounded pages, tracks the last position, and can be saved, restored, or streamed.

use std::collections::VecDeque;
use std::marker::PhantomData;

use futures::Stream;
use razonable_core::{Direction, Index, OrderValue, Record, ResumePoint, SavedCursor};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::engine::{self, Engine, Mode, RECORD_COLUMNS, RawRecord};
use crate::error::StoreError;

/// A position marker walking one ordering of a store.
///
/// A fresh cursor has no position and `has_more() == true`. Each page
/// request advances the position to the last record returned; once the
/// ordering is exhausted `has_more()` turns false. The cursor never owns
/// record data, only where it stopped.
#[derive(Debug)]
pub struct Cursor<T = serde_json::Value> {
    engine: Engine,
    index: Option<Index>,
    direction: Direction,
    last: Option<ResumePoint>,
    has_more: bool,
    page_size: usize,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Cursor<T> {
    pub(crate) fn new(engine: Engine, index: Option<Index>, direction: Direction, page_size: usize) -> Self {
        Self {
            engine,
            index,
            direction,
            last: None,
            has_more: true,
            page_size,
            _payload: PhantomData,
        }
    }

    /// Whether the ordering is known to have records beyond the last page.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The secondary index this cursor walks, `None` for the primary key.
    pub fn index(&self) -> Option<Index> {
        self.index
    }

    /// The last position observed, `None` before the first non-empty page.
    pub fn position(&self) -> Option<&ResumePoint> {
        self.last.as_ref()
    }

    /// Page size used by [`Cursor::next`] and [`Cursor::filter`].
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Serialize position and direction. Index and `has_more` are not saved.
    pub fn save(&self) -> String {
        SavedCursor::new(self.last.as_ref(), self.direction).save()
    }

    /// Restore position and direction from [`Cursor::save`] output.
    ///
    /// The index stays whatever this cursor was created with, so it must
    /// match the one in use when the state was saved.
    pub fn load(&mut self, saved: &str) -> Result<(), StoreError> {
        let saved = SavedCursor::load(saved)?;
        let position = saved.position();
        if let Some(point) = &position {
            point.check(self.ordering())?;
        }
        self.last = position;
        self.direction = saved.direction;
        self.has_more = true;
        Ok(())
    }

    fn ordering(&self) -> Index {
        self.index.unwrap_or(Index::Key)
    }
}

impl<T: DeserializeOwned> Cursor<T> {
    /// Fetch the next page using the cursor's default page size.
    pub async fn next(&mut self) -> Result<Vec<Record<T>>, StoreError> {
        self.next_page(self.page_size).await
    }

    /// Fetch up to `page_size` records strictly beyond the current position.
    ///
    /// Any failure leaves the position untouched and sets `has_more` to
    /// false so a possibly bad position is not resumed from.
    pub async fn next_page(&mut self, page_size: usize) -> Result<Vec<Record<T>>, StoreError> {
        if page_size == 0 {
            return Err(StoreError::InvalidPageSize);
        }

        match self.fetch(page_size).await {
            Ok(page) => Ok(page),
            Err(e) => {
                self.has_more = false;
                Err(e)
            }
        }
    }

    /// Fetch one default-sized page and keep the records matching `predicate`.
    ///
    /// Only a single page is consumed; call again to filter the next one.
    pub async fn filter<P>(&mut self, mut predicate: P) -> Result<Vec<Record<T>>, StoreError>
    where
        P: FnMut(&Record<T>) -> bool,
    {
        let page = self.next().await?;
        Ok(page.into_iter().filter(|r| predicate(r)).collect())
    }

    /// Turn the cursor into a stream of records, fetched one page at a time.
    ///
    /// The stream yields to the scheduler before each page and ends at the
    /// next page boundary after `cancel` fires, after the ordering is
    /// exhausted, or after the first error.
    pub fn into_stream(self, cancel: CancellationToken) -> impl Stream<Item = Result<Record<T>, StoreError>> {
        let state = (self, VecDeque::new(), cancel, false);

        futures::stream::unfold(state, |(mut cursor, mut buffer, cancel, failed)| async move {
            loop {
                if let Some(record) = buffer.pop_front() {
                    return Some((Ok(record), (cursor, buffer, cancel, failed)));
                }
                if failed || !cursor.has_more || cancel.is_cancelled() {
                    return None;
                }

                tokio::task::yield_now().await;
                if cancel.is_cancelled() {
                    return None;
                }

                match cursor.next().await {
                    Ok(page) => buffer.extend(page),
                    Err(e) => return Some((Err(e), (cursor, buffer, cancel, true))),
                }
            }
        })
    }

    async fn fetch(&mut self, page_size: usize) -> Result<Vec<Record<T>>, StoreError> {
        let ordering = self.ordering();
        let query = PageQuery::build(ordering, self.direction, self.last.as_ref(), page_size);

        let (rows, exhausted) = self
            .engine
            .transact("cursor page", Mode::ReadOnly, move |tx| {
                let mut stmt = tx.prepare(&query.sql)?;
                let rows = stmt
                    .query_map(params_from_iter(query.params.iter()), engine::read_row)?
                    .collect::<Result<Vec<RawRecord>, _>>()?;
                Ok(rows)
            })
            .await
            .map(|mut rows| {
                // One extra row was requested to learn whether more remain.
                let exhausted = rows.len() <= page_size;
                rows.truncate(page_size);
                (rows, exhausted)
            })?;

        let last = rows.last().map(|raw| ResumePoint::of(raw, ordering));
        let page = rows
            .into_iter()
            .map(engine::decode)
            .collect::<Result<Vec<Record<T>>, StoreError>>()?;

        if let Some(point) = last {
            self.last = Some(point);
        }
        self.has_more = !exhausted;

        tracing::debug!(
            "cursor page over {} ({}): {} records, has_more={}",
            ordering,
            self.direction,
            page.len(),
            self.has_more
        );

        Ok(page)
    }
}

/// SQL and parameters for one page of a cursor scan.
#[derive(Debug)]
struct PageQuery {
    sql: String,
    params: Vec<Value>,
}

impl PageQuery {
    /// Select up to `page_size + 1` rows strictly beyond `after` along
    /// `ordering` in `direction`.
    ///
    /// Timestamp orderings are not unique, so they sort and bound on
    /// `(column, key)`; a position without a tiebreak key bounds on the
    /// column alone.
    fn build(ordering: Index, direction: Direction, after: Option<&ResumePoint>, page_size: usize) -> Self {
        let column = ordering.as_str();
        let (cmp, dir) = match direction {
            Direction::Forward => (">", "ASC"),
            Direction::Reverse => ("<", "DESC"),
        };

        let mut params = Vec::new();
        let bound = match after {
            None => String::new(),
            Some(point) => {
                params.push(order_value(&point.value));
                match (&point.key, ordering.is_unique()) {
                    (Some(key), false) => {
                        params.push(Value::Text(key.clone()));
                        format!("WHERE ({column}, key) {cmp} (?1, ?2)")
                    }
                    _ => format!("WHERE {column} {cmp} ?1"),
                }
            }
        };

        let order = if ordering.is_unique() {
            format!("ORDER BY {column} {dir}")
        } else {
            format!("ORDER BY {column} {dir}, key {dir}")
        };

        let limit = i64::try_from(page_size).unwrap_or(i64::MAX - 1) + 1;
        params.push(Value::Integer(limit));
        let limit_param = params.len();

        Self {
            sql: format!("SELECT {RECORD_COLUMNS} FROM records {bound} {order} LIMIT ?{limit_param}"),
            params,
        }
    }
}

fn order_value(value: &OrderValue) -> Value {
    match value {
        OrderValue::Int(n) => Value::Integer(*n),
        OrderValue::Text(s) => Value::Text(s.clone()),
    }
}
