mod common;

use common::FlakyStore;
use futures::future::join_all;
use parley_core::store::{RemoteMessageStore, SqliteStore, StorePath};
use parley_core::unread::{CounterOutcome, UnreadCounterService};
use std::sync::atomic::Ordering;
use std::sync::Arc;

async fn concurrent_increments(store: Arc<dyn RemoteMessageStore>, k: usize) -> u64 {
    let unread = UnreadCounterService::new(store);
    let outcomes = join_all((0..k).map(|_| {
        let unread = unread.clone();
        tokio::spawn(async move { unread.increment("c1", "bob").await })
    }))
    .await;

    for outcome in outcomes {
        assert!(outcome.unwrap().is_applied());
    }
    unread.unread_count("c1", "bob").await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_on_memory_store_are_not_lost() {
    let count = concurrent_increments(common::memory_store(), 100).await;
    assert_eq!(count, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_on_sqlite_are_not_lost() {
    let pool = common::setup_file_db().await;
    let store = Arc::new(SqliteStore::new(pool, 50));
    let count = concurrent_increments(store, 25).await;
    assert_eq!(count, 25);
}

#[tokio::test]
async fn absent_counter_starts_at_one() {
    let unread = UnreadCounterService::new(common::memory_store());

    assert_eq!(unread.unread_count("c1", "bob").await.unwrap(), 0);
    assert_eq!(unread.increment("c1", "bob").await, CounterOutcome::Applied(1));
    assert_eq!(unread.increment("c1", "bob").await, CounterOutcome::Applied(2));
}

#[tokio::test]
async fn increment_saturates_at_max() {
    let store = common::memory_store();
    store
        .set(&StorePath::unread_counter("bob", "c1"), serde_json::json!(u64::MAX))
        .await
        .unwrap();
    let unread = UnreadCounterService::new(store);

    assert_eq!(unread.increment("c1", "bob").await, CounterOutcome::Applied(u64::MAX));
    assert_eq!(unread.unread_count("c1", "bob").await.unwrap(), u64::MAX);
}

#[tokio::test]
async fn reset_sets_zero() {
    let unread = UnreadCounterService::new(common::memory_store());
    unread.increment("c1", "bob").await;
    unread.increment("c1", "bob").await;

    assert_eq!(unread.reset("c1", "bob").await, CounterOutcome::Applied(0));
    assert_eq!(unread.unread_count("c1", "bob").await.unwrap(), 0);
}

#[tokio::test]
async fn recipients_exclude_the_sender() {
    let unread = UnreadCounterService::new(common::memory_store());
    let members: Vec<String> = ["alice", "bob", "carol"].iter().map(|s| s.to_string()).collect();

    let outcomes = unread
        .increment_for_recipients("c1", &members, "alice")
        .await;

    assert_eq!(
        outcomes,
        vec![
            ("bob".to_string(), CounterOutcome::Applied(1)),
            ("carol".to_string(), CounterOutcome::Applied(1)),
        ]
    );
    assert_eq!(unread.unread_count("c1", "alice").await.unwrap(), 0);
}

#[tokio::test]
async fn failures_are_reported_as_stale() {
    let flaky = Arc::new(FlakyStore::new(common::memory_store()));
    flaky.fail_transactions.store(true, Ordering::SeqCst);
    flaky.fail_sets.store(true, Ordering::SeqCst);
    let unread = UnreadCounterService::new(flaky.clone());

    assert_eq!(unread.increment("c1", "bob").await, CounterOutcome::Stale);
    assert_eq!(unread.reset("c1", "bob").await, CounterOutcome::Stale);

    flaky.fail_transactions.store(false, Ordering::SeqCst);
    assert_eq!(unread.increment("c1", "bob").await, CounterOutcome::Applied(1));
}
