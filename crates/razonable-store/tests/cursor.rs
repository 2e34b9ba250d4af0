// ABOUTME: Integration tests for cursor paging, ordering, resume, filtering, and streaming.
// ABOUTME: Runs against in-memory and on-disk stores with a stepped clock for stable timestamps.

use std::sync::Arc;

use futures::StreamExt;
use razonable_store::{
    CancellationToken, Cursor, Direction, Index, ManualClock, Record, Store, StoreConfig, StoreError,
};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Store with keys k00..k{n-1}, written in reverse key order so creation
/// order differs from key order.
async fn seeded(n: usize) -> Store {
    let store = Store::open_in_memory()
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(1_000, 10)));
    for i in (0..n).rev() {
        store.set(&format!("k{:02}", i), json!({ "i": i })).await.unwrap();
    }
    store
}

fn keys<T>(records: &[Record<T>]) -> Vec<String> {
    records.iter().map(|r| r.key.clone()).collect()
}

fn open_cursor(store: &Store, index: Option<Index>, direction: Direction) -> Cursor {
    match (index, direction) {
        (None, Direction::Forward) => store.cursor(),
        (None, Direction::Reverse) => store.cursor_with_index(Index::Key, Direction::Reverse),
        (Some(index), _) => store.cursor_with_index(index, direction),
    }
}

async fn drain_pages(cursor: &mut Cursor, page_size: usize) -> Vec<Record<Value>> {
    let mut all = Vec::new();
    while cursor.has_more() {
        all.extend(cursor.next_page(page_size).await.unwrap());
    }
    all
}

#[tokio::test]
async fn empty_store_first_page_is_empty_and_final() {
    let store = Store::open_in_memory().unwrap();
    let mut cursor: Cursor = store.cursor();

    assert!(cursor.has_more());
    let page = cursor.next().await.unwrap();

    assert!(page.is_empty());
    assert!(!cursor.has_more());
    assert!(cursor.position().is_none());
}

#[tokio::test]
async fn paging_matches_single_large_page() {
    let store = seeded(11).await;

    let mut whole: Cursor = store.cursor();
    let expected = whole.next_page(100).await.unwrap();
    assert_eq!(expected.len(), 11);
    assert!(!whole.has_more());

    for page_size in [1, 2, 3, 4, 10, 11, 12] {
        let mut cursor: Cursor = store.cursor();
        let paged = drain_pages(&mut cursor, page_size).await;
        assert_eq!(paged, expected, "page size {}", page_size);
    }
}

#[tokio::test]
async fn every_ordering_and_direction_is_sorted() {
    let store = seeded(6).await;
    let ascending: Vec<String> = (0..6).map(|i| format!("k{:02}", i)).collect();
    let descending: Vec<String> = ascending.iter().rev().cloned().collect();

    let mut by_key: Cursor = store.cursor_with_index(Index::Key, Direction::Reverse);
    assert_eq!(keys(&drain_pages(&mut by_key, 4).await), descending);

    // Seeded in reverse key order, so oldest first is highest key first
    let mut by_created: Cursor = store.cursor_with_index(Index::Created, Direction::Forward);
    assert_eq!(keys(&drain_pages(&mut by_created, 4).await), descending);

    let mut by_created_rev: Cursor = store.cursor_with_index(Index::Created, Direction::Reverse);
    assert_eq!(keys(&drain_pages(&mut by_created_rev, 4).await), ascending);

    // Touch k00 so it becomes the most recently updated
    store.set("k00", json!({ "i": 0, "touched": true })).await.unwrap();
    let mut by_updated: Cursor = store.cursor_with_index(Index::Updated, Direction::Reverse);
    let records = drain_pages(&mut by_updated, 2).await;
    assert_eq!(records[0].key, "k00");
    assert_eq!(records.len(), 6);
}

#[tokio::test]
async fn created_ordering_pages_oldest_first() {
    let store = Store::open_in_memory()
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(100, 1)));
    store.set("first", json!(1)).await.unwrap();
    store.set("second", json!(2)).await.unwrap();
    store.set("third", json!(3)).await.unwrap();

    let mut cursor: Cursor = store.cursor_with_index(Index::Created, Direction::Forward);

    let page = cursor.next_page(2).await.unwrap();
    assert_eq!(keys(&page), vec!["first", "second"]);
    assert!(cursor.has_more());

    let page = cursor.next_page(2).await.unwrap();
    assert_eq!(keys(&page), vec!["third"]);
    assert!(!cursor.has_more());
}

#[tokio::test]
async fn resume_after_save_yields_each_remaining_record_once() {
    let store = seeded(9).await;

    let cases = [
        (None, Direction::Forward),
        (None, Direction::Reverse),
        (Some(Index::Created), Direction::Forward),
        (Some(Index::Created), Direction::Reverse),
        (Some(Index::Updated), Direction::Forward),
        (Some(Index::Updated), Direction::Reverse),
    ];

    for (index, direction) in cases {
        let mut reference = open_cursor(&store, index, direction);
        let expected = drain_pages(&mut reference, 100).await;

        for page_size in 1..=4 {
            let mut cursor = open_cursor(&store, index, direction);
            let mut seen = cursor.next_page(page_size).await.unwrap();
            let saved = cursor.save();
            drop(cursor);

            let mut resumed: Cursor = store.restore_cursor(&saved, index).unwrap();
            assert_eq!(resumed.direction(), direction);
            seen.extend(drain_pages(&mut resumed, page_size).await);

            assert_eq!(
                seen, expected,
                "index {:?}, direction {}, page size {}",
                index, direction, page_size
            );
        }
    }
}

#[tokio::test]
async fn resume_with_shared_timestamps_does_not_skip() {
    // Every write lands on the same millisecond
    let store = Store::open_in_memory()
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(42, 0)));
    store
        .multi_set([("a", 1), ("b", 2), ("c", 3), ("d", 4)])
        .await
        .unwrap();

    let mut cursor: Cursor<i64> = store.cursor_with_index(Index::Updated, Direction::Forward);
    let first = cursor.next_page(1).await.unwrap();
    let saved = cursor.save();

    let mut resumed: Cursor<i64> = store.restore_cursor(&saved, Some(Index::Updated)).unwrap();
    let mut rest = Vec::new();
    while resumed.has_more() {
        rest.extend(resumed.next_page(1).await.unwrap());
    }

    assert_eq!(keys(&first), vec!["a"]);
    assert_eq!(keys(&rest), vec!["b", "c", "d"]);
}

#[tokio::test]
async fn final_page_records_resume_point() {
    let store = seeded(3).await;
    let mut cursor: Cursor = store.cursor();

    let page = cursor.next_page(10).await.unwrap();
    assert_eq!(page.len(), 3);
    assert!(!cursor.has_more());

    // Resuming from a finished cursor finds nothing further
    let mut resumed: Cursor = store.restore_cursor(&cursor.save(), None).unwrap();
    assert!(resumed.next().await.unwrap().is_empty());
    assert!(!resumed.has_more());

    // New records beyond the last key are picked up on resume
    store.set("k99", json!({ "i": 99 })).await.unwrap();
    let mut resumed: Cursor = store.restore_cursor(&cursor.save(), None).unwrap();
    assert_eq!(keys(&resumed.next().await.unwrap()), vec!["k99"]);
}

#[tokio::test]
async fn filter_with_always_true_equals_next() {
    let store = Store::open_with(StoreConfig::memory().with_page_size(3)).unwrap();
    for i in 0..7 {
        store.set(&format!("k{}", i), json!(i)).await.unwrap();
    }

    let mut plain: Cursor = store.cursor();
    let mut filtered: Cursor = store.cursor();

    let expected = plain.next().await.unwrap();
    let got = filtered.filter(|_| true).await.unwrap();
    assert_eq!(got, expected);
    assert_eq!(got.len(), 3);

    // Only one page is consumed per call
    let evens = filtered.filter(|r| r.payload.as_i64().unwrap() % 2 == 0).await.unwrap();
    assert_eq!(keys(&evens), vec!["k4"]);
    assert!(filtered.has_more());
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let store = seeded(2).await;
    let mut cursor: Cursor = store.cursor();

    let err = cursor.next_page(0).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidPageSize));
}

#[tokio::test]
async fn decode_failure_stops_the_cursor() {
    let store = Store::open_in_memory().unwrap();
    store.set("a", json!("not a number")).await.unwrap();

    let mut cursor: Cursor<i64> = store.cursor();
    let err = cursor.next().await.unwrap_err();

    assert!(matches!(err, StoreError::Json(_)));
    assert!(!cursor.has_more());
    assert!(cursor.position().is_none());
}

#[tokio::test]
async fn restore_rejects_mismatched_index() {
    let store = seeded(3).await;
    let mut cursor: Cursor = store.cursor_with_index(Index::Created, Direction::Forward);
    cursor.next_page(1).await.unwrap();

    let err = store.restore_cursor::<Value>(&cursor.save(), None).unwrap_err();
    assert!(matches!(err, StoreError::Cursor(_)));

    assert!(store.restore_cursor::<Value>("{oops", None).is_err());
}

#[tokio::test]
async fn stream_yields_all_records_across_pages() {
    let store = Store::open_with(StoreConfig::memory().with_page_size(2)).unwrap();
    for i in 0..5 {
        store.set(&format!("k{}", i), json!(i)).await.unwrap();
    }

    let cursor: Cursor<i64> = store.cursor();
    let records: Vec<Record<i64>> = cursor
        .into_stream(CancellationToken::new())
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(keys(&records), vec!["k0", "k1", "k2", "k3", "k4"]);
}

#[tokio::test]
async fn stream_stops_after_cancel_at_page_boundary() {
    let store = Store::open_with(StoreConfig::memory().with_page_size(2)).unwrap();
    for i in 0..6 {
        store.set(&format!("k{}", i), json!(i)).await.unwrap();
    }

    let cancel = CancellationToken::new();
    let cursor: Cursor<i64> = store.cursor();
    let stream = cursor.into_stream(cancel.clone());
    let mut stream = std::pin::pin!(stream);

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.key, "k0");
    cancel.cancel();

    // The rest of the current page is still delivered
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(second.key, "k1");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn cursor_on_disk_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.db");

    let saved = {
        let store = Store::open(&path).unwrap();
        store
            .multi_set([("a", 1), ("b", 2), ("c", 3)])
            .await
            .unwrap();
        let mut cursor: Cursor<i64> = store.cursor();
        cursor.next_page(2).await.unwrap();
        cursor.save()
    };

    let store = Store::open(&path).unwrap();
    let mut cursor: Cursor<i64> = store.restore_cursor(&saved, None).unwrap();
    let rest = cursor.next().await.unwrap();

    assert_eq!(keys(&rest), vec!["c"]);
    assert!(!cursor.has_more());
}
