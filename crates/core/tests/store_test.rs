mod common;

use futures::StreamExt;
use parley_core::store::{
    MemoryStore, PushIdGenerator, RangeQuery, RemoteMessageStore, SqliteStore, StorePath,
};
use parley_core::StoreError;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

async fn put(store: &dyn RemoteMessageStore, collection: &str, key: &str, value: Value) {
    store
        .set(&StorePath::record(collection, key), value)
        .await
        .unwrap();
}

fn keys(records: &[parley_core::store::Record]) -> Vec<&str> {
    records.iter().map(|r| r.key.as_str()).collect()
}

async fn exercise_range_queries(store: &dyn RemoteMessageStore) {
    for key in ["a", "b", "c", "d", "e"] {
        put(store, "letters", key, json!({ "k": key })).await;
    }
    let letters = StorePath::collection("letters");

    let last = store.range_query(&letters, RangeQuery::last(2)).await.unwrap();
    assert_eq!(keys(&last), vec!["d", "e"]);

    let first = store.range_query(&letters, RangeQuery::first(2)).await.unwrap();
    assert_eq!(keys(&first), vec!["a", "b"]);

    let ending = store
        .range_query(&letters, RangeQuery::last(3).ending_at("c"))
        .await
        .unwrap();
    assert_eq!(keys(&ending), vec!["a", "b", "c"]);

    let short = store
        .range_query(&letters, RangeQuery::last(10).ending_at("b"))
        .await
        .unwrap();
    assert_eq!(keys(&short), vec!["a", "b"]);

    let empty = store
        .range_query(&StorePath::collection("nothing"), RangeQuery::last(5))
        .await
        .unwrap();
    assert!(empty.is_empty());
}

async fn exercise_field_writes(store: &dyn RemoteMessageStore) {
    let doc = StorePath::record("docs", "d1");
    store.set(&doc, json!({ "title": "x" })).await.unwrap();

    let nested = doc.child("reactions").child("👍");
    let increment = |current: Option<&Value>| {
        Value::from(current.and_then(Value::as_u64).unwrap_or(0) + 1)
    };
    assert_eq!(store.transact(&nested, &increment).await.unwrap(), json!(1));
    assert_eq!(store.transact(&nested, &increment).await.unwrap(), json!(2));

    let mut fields = Map::new();
    fields.insert("title".into(), json!("y"));
    fields.insert("extra".into(), json!(true));
    store.update(&doc, fields).await.unwrap();

    let value = store.get(&doc).await.unwrap().unwrap();
    assert_eq!(value, json!({ "title": "y", "extra": true, "reactions": { "👍": 2 } }));
    assert_eq!(store.get(&nested).await.unwrap(), Some(json!(2)));
    assert_eq!(store.get(&doc.child("missing")).await.unwrap(), None);
}

async fn exercise_subscription(store: &dyn RemoteMessageStore) {
    put(store, "feed", "a", json!(1)).await;
    put(store, "feed", "b", json!(2)).await;

    let path = StorePath::collection("feed");
    let mut replay_all = store.subscribe_child_added(&path, None).await.unwrap();
    let mut after_a = store
        .subscribe_child_added(&path, Some("a".into()))
        .await
        .unwrap();

    put(store, "feed", "c", json!(3)).await;
    // updates to existing records are not child-added events
    put(store, "feed", "a", json!(10)).await;
    put(store, "feed", "d", json!(4)).await;

    let mut seen = Vec::new();
    for _ in 0..4 {
        let record = tokio::time::timeout(Duration::from_secs(1), replay_all.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(record.key);
    }
    assert_eq!(seen, vec!["a", "b", "c", "d"]);

    let mut seen = Vec::new();
    for _ in 0..3 {
        let record = tokio::time::timeout(Duration::from_secs(1), after_a.next())
            .await
            .unwrap()
            .unwrap();
        seen.push(record.key);
    }
    assert_eq!(seen, vec!["b", "c", "d"]);

    replay_all.cancel().await;
    after_a.cancel().await;
}

#[tokio::test]
async fn memory_store_range_queries() {
    exercise_range_queries(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_field_writes() {
    exercise_field_writes(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_store_subscriptions() {
    let store = MemoryStore::new();
    exercise_subscription(&store).await;
    assert_eq!(store.hub().subscriber_count("feed").await, 0);
}

#[tokio::test]
async fn sqlite_store_range_queries() {
    let store = SqliteStore::new(common::setup_test_db().await, 5);
    exercise_range_queries(&store).await;
}

#[tokio::test]
async fn sqlite_store_field_writes() {
    let store = SqliteStore::new(common::setup_test_db().await, 5);
    exercise_field_writes(&store).await;
}

#[tokio::test]
async fn sqlite_store_subscriptions() {
    let store = SqliteStore::new(common::setup_test_db().await, 5);
    exercise_subscription(&store).await;
    assert_eq!(store.hub().subscriber_count("feed").await, 0);
}

#[tokio::test]
async fn sqlite_handles_share_a_hub() {
    let pool = common::setup_test_db().await;
    let writer = SqliteStore::new(pool.clone(), 5);
    let reader = SqliteStore::with_hub(pool, writer.hub().clone(), 5);

    let mut feed = reader
        .subscribe_child_added(&StorePath::collection("feed"), None)
        .await
        .unwrap();
    put(&writer, "feed", "x", json!("hello")).await;

    let record = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.key, "x");
    assert_eq!(record.value, json!("hello"));
}

#[tokio::test]
async fn dropped_subscription_is_pruned() {
    let store = MemoryStore::new();
    let feed = store
        .subscribe_child_added(&StorePath::collection("feed"), None)
        .await
        .unwrap();
    assert_eq!(store.hub().subscriber_count("feed").await, 1);

    drop(feed);
    put(&store, "feed", "a", json!(1)).await;
    assert_eq!(store.hub().subscriber_count("feed").await, 0);
}

#[tokio::test]
async fn invalid_paths_are_rejected() {
    let store = MemoryStore::new();

    let result = store
        .range_query(&StorePath::record("docs", "d1"), RangeQuery::last(1))
        .await;
    assert!(matches!(result, Err(StoreError::InvalidPath(_))));

    let result = store.set(&StorePath::collection("docs"), json!(1)).await;
    assert!(matches!(result, Err(StoreError::InvalidPath(_))));

    let result = store.get(&StorePath::record("docs", "")).await;
    assert!(matches!(result, Err(StoreError::InvalidPath(_))));
}

#[test]
fn store_paths_render_as_slash_separated() {
    assert_eq!(StorePath::user("u1").to_string(), "users/u1");
    assert_eq!(
        StorePath::message("c1", "m1").to_string(),
        "channel-messages/c1/m1"
    );
    assert_eq!(
        StorePath::reaction_count("c1", "m1", "👍").to_string(),
        "channel-messages/c1/m1/reactions/👍"
    );
    assert_eq!(
        StorePath::unread_counter("u1", "c1").to_string(),
        "user-channels/u1/c1"
    );
    assert_eq!(
        StorePath::direct_channel("u1", "u2").to_string(),
        "user-direct-channels/u1/u2"
    );
    assert!(StorePath::channel_messages("c1").is_collection());
}

#[test]
fn push_ids_are_ordered_and_unique() {
    let ids = PushIdGenerator::new();
    let generated: Vec<String> = (0..2000).map(|_| ids.generate()).collect();

    assert!(generated.iter().all(|id| id.len() == 20));
    assert!(generated.windows(2).all(|w| w[0] < w[1]));
    let unique: HashSet<&String> = generated.iter().collect();
    assert_eq!(unique.len(), generated.len());
}

#[tokio::test]
async fn push_ids_from_one_store_are_shared_across_tasks() {
    let store = Arc::new(MemoryStore::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { (0..100).map(|_| store.push_key()).collect::<Vec<_>>() })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(all.insert(id));
        }
    }
    assert_eq!(all.len(), 800);
}
