//! Retention purge and the background sweep against the in-memory store.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use blog_admin::audit::retention::{RetentionError, purge_expired, spawn_retention_sweep};
use blog_admin::audit::{AuditFilter, AuditStore, NewAuditRecord, PageRequest};
use chrono::Utc;
use helpers::MemoryAuditStore;
use tokio_util::sync::CancellationToken;

fn record(operation: &str) -> NewAuditRecord {
    NewAuditRecord::new(operation, "test", "ARTICLE")
}

fn days_ago(days: i64) -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::days(days)
}

#[tokio::test]
async fn retain_days_below_floor_never_reaches_the_store() {
    let store = MemoryAuditStore::default();
    store.insert_at(days_ago(400), record("BATCH_DELETE"));

    let err = purge_expired(&store, 3).await.unwrap_err();

    assert!(matches!(err, RetentionError::BelowFloor(3)));
    assert_eq!(store.purge_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn retain_days_past_the_representable_range_are_rejected() {
    let store = MemoryAuditStore::default();
    store.insert_at(days_ago(400), record("BATCH_DELETE"));

    for days in [1_000_000_000, i64::MAX] {
        let err = purge_expired(&store, days).await.unwrap_err();
        assert!(matches!(err, RetentionError::OutOfRange(d) if d == days));
    }
    assert_eq!(store.purge_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn purge_removes_only_records_past_the_cutoff() {
    let store = MemoryAuditStore::default();
    store.insert_at(days_ago(45), record("BATCH_PUBLISH"));
    store.insert_at(days_ago(31), record("BATCH_DELETE"));
    let kept_recent = store.insert_at(days_ago(29), record("CATEGORY_MOVE"));
    let kept_today = store.insert_at(Utc::now(), record("DELETE_ARTICLE"));

    let deleted = purge_expired(&store, 30).await.unwrap();

    assert_eq!(deleted, 2);
    let remaining: Vec<i64> = store.records().iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec![kept_recent.id, kept_today.id]);

    // A second run has nothing left to do.
    assert_eq!(purge_expired(&store, 30).await.unwrap(), 0);
}

#[tokio::test]
async fn purge_at_the_floor_is_allowed() {
    let store = MemoryAuditStore::default();
    store.insert_at(days_ago(8), record("BATCH_PUBLISH"));
    store.insert_at(days_ago(6), record("BATCH_PUBLISH"));

    assert_eq!(purge_expired(&store, 7).await.unwrap(), 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn store_failure_surfaces_as_store_error() {
    let store = MemoryAuditStore::failing();

    let err = purge_expired(&store, 30).await.unwrap_err();

    assert!(matches!(err, RetentionError::Store(_)));
    assert_eq!(store.purge_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sweep_purges_immediately_and_stops_on_cancel() {
    let store = Arc::new(MemoryAuditStore::default());
    store.insert_at(days_ago(90), record("BATCH_DELETE"));
    store.insert_at(days_ago(1), record("BATCH_PUBLISH"));
    let cancel = CancellationToken::new();

    let handle = spawn_retention_sweep(
        store.clone(),
        30,
        Duration::from_secs(3600),
        cancel.clone(),
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while store.purge_calls.load(Ordering::SeqCst) == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(store.purge_calls.load(Ordering::SeqCst), 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweep should stop after cancellation")
        .unwrap();

    let page = store
        .query(&AuditFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].operation_type, "BATCH_PUBLISH");
}
