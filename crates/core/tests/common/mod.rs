#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parley_core::config::Config;
use parley_core::db;
use parley_core::directory::UserDirectory;
use parley_core::live::ChildAdded;
use parley_core::models::{
    AdminEvent, Channel, ChatMessage, MediaBody, MessageKind, OutgoingMessage, User,
};
use parley_core::store::{ApplyFn, MemoryStore, RangeQuery, Record, RemoteMessageStore, StorePath};
use parley_core::{SessionHandle, StoreError};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Create an in-memory SQLite pool with schema applied.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    db::apply_schema(&pool).await.unwrap();
    pool
}

/// A file-backed database so several connections can contend for writes.
pub async fn setup_file_db() -> SqlitePool {
    let path = std::env::temp_dir()
        .join("parley-tests")
        .join(format!("{}.db", uuid::Uuid::new_v4()));
    db::init_pool(path.to_str().unwrap()).await.unwrap()
}

pub fn test_config() -> Config {
    Config {
        database_path: ":memory:".into(),
        reaction_apply_delay: Duration::from_millis(10),
        ..Config::default()
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

pub async fn seed_users(store: Arc<dyn RemoteMessageStore>, names: &[&str]) -> Vec<User> {
    let users = UserDirectory::new(store);
    let mut seeded = Vec::new();
    for name in names {
        let user = User::new(*name, *name, format!("{}@test.com", name));
        users.put_user(&user).await.unwrap();
        seeded.push(user);
    }
    seeded
}

/// Write a channel record directly, without the creation message the
/// directory adds.
pub async fn seed_channel(store: &dyn RemoteMessageStore, members: &[User]) -> Channel {
    let now = Utc::now() - ChronoDuration::hours(2);
    let channel = Channel {
        id: store.push_key(),
        name: None,
        member_ids: members.iter().map(|u| u.uid.clone()).collect(),
        members: members.to_vec(),
        admin_ids: vec![members[0].uid.clone()],
        created_by: members[0].uid.clone(),
        creation_date: now,
        last_message: String::new(),
        last_message_timestamp: now,
        last_message_kind: MessageKind::Admin(AdminEvent::ChannelCreation),
        unread_count: 0,
    };
    store
        .set(&StorePath::channel(&channel.id), channel.to_record())
        .await
        .unwrap();
    channel
}

/// Timestamp of the `index`th seeded message: one second apart, an hour ago.
pub fn seeded_time(index: usize) -> DateTime<Utc> {
    let base = Utc::now() - ChronoDuration::hours(1);
    let base = DateTime::from_timestamp(base.timestamp(), 0).unwrap();
    base + ChronoDuration::seconds(index as i64)
}

/// Write `count` text messages; returns their ids oldest first.
pub async fn seed_messages(
    store: &dyn RemoteMessageStore,
    channel_id: &str,
    sender_id: &str,
    count: usize,
) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let mut message = OutgoingMessage::text(sender_id, format!("message {}", i + 1));
        message.timestamp = seeded_time(i);
        let id = store.push_key();
        store
            .set(&StorePath::message(channel_id, &id), message.to_record())
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}

pub fn text_message(id: &str, sender_id: &str, seconds: i64) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        sender_id: sender_id.to_string(),
        sender: None,
        kind: MessageKind::Text,
        text: format!("text of {}", id),
        media: MediaBody::default(),
        timestamp: DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap(),
        reaction_counts: HashMap::new(),
        user_reactions: HashMap::new(),
    }
}

pub fn ids(messages: &[ChatMessage]) -> Vec<String> {
    messages.iter().map(|m| m.id.clone()).collect()
}

/// Wait until the session's list satisfies `predicate`.
pub async fn wait_for_messages<F>(session: &SessionHandle, predicate: F) -> Vec<ChatMessage>
where
    F: Fn(&[ChatMessage]) -> bool,
{
    let mut rx = session.messages();
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        rx.wait_for(|messages| predicate(messages.as_slice())).await.map(|m| m.clone())
    })
    .await;
    result
        .expect("Timed out waiting for messages")
        .expect("Session dropped")
}

/// Store wrapper that fails selected operations on demand and counts range
/// queries.
pub struct FlakyStore {
    inner: Arc<dyn RemoteMessageStore>,
    pub fail_reads: AtomicBool,
    pub fail_transactions: AtomicBool,
    pub fail_sets: AtomicBool,
    pub range_queries: AtomicUsize,
    /// Range queries wait on this lock; hold it to park them.
    pub range_gate: tokio::sync::Mutex<()>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn RemoteMessageStore>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_transactions: AtomicBool::new(false),
            fail_sets: AtomicBool::new(false),
            range_queries: AtomicUsize::new(0),
            range_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn range_query_count(&self) -> usize {
        self.range_queries.load(Ordering::SeqCst)
    }

    /// Resolve once more than `seen` range queries have started.
    pub async fn range_query_started(&self, seen: usize) {
        while self.range_query_count() <= seen {
            tokio::task::yield_now().await;
        }
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteMessageStore for FlakyStore {
    fn push_key(&self) -> String {
        self.inner.push_key()
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get(path).await
    }

    async fn range_query(
        &self,
        path: &StorePath,
        query: RangeQuery,
    ) -> Result<Vec<Record>, StoreError> {
        self.range_queries.fetch_add(1, Ordering::SeqCst);
        let _open = self.range_gate.lock().await;
        Self::check(&self.fail_reads)?;
        self.inner.range_query(path, query).await
    }

    async fn subscribe_child_added(
        &self,
        path: &StorePath,
        start_after: Option<String>,
    ) -> Result<ChildAdded, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.subscribe_child_added(path, start_after).await
    }

    async fn transact(
        &self,
        path: &StorePath,
        apply: &ApplyFn,
    ) -> Result<Value, StoreError> {
        Self::check(&self.fail_transactions)?;
        self.inner.transact(path, apply).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        Self::check(&self.fail_sets)?;
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        Self::check(&self.fail_sets)?;
        self.inner.update(path, fields).await
    }
}
