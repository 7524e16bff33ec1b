//! Contract of the remote message store and the path layout the pipeline
//! uses on top of it.
//!
//! A store is a tree of collections. Each collection holds records ordered by
//! key; a record is a JSON document, and a path may point below a record into
//! one of its fields (for example a single reaction counter).

mod document;
mod ids;
mod memory;
mod sqlite;

pub use ids::PushIdGenerator;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub(crate) use document::{merge_fields, read_field, write_field};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

use parley_shared::constants::{
    CHANNELS_ROOT, CHANNEL_MESSAGES_ROOT, USERS_ROOT, USER_CHANNELS_ROOT,
    USER_DIRECT_CHANNELS_ROOT,
};

use crate::error::StoreError;
use crate::live::ChildAdded;
use crate::models::{REACTIONS_FIELD, USER_REACTIONS_FIELD};

/// Update function handed to [`RemoteMessageStore::transact`]. It may run
/// more than once when a transaction is retried.
pub type ApplyFn = dyn for<'a> Fn(Option<&'a Value>) -> Value + Send + Sync;

/// A record as returned by range queries and child-added subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The lowest keys of the range.
    First,
    /// The highest keys of the range.
    Last,
}

/// Bounded key-range query over one collection. Results are always returned
/// in ascending key order whatever the direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub end_at: Option<String>,
    pub limit: usize,
    pub direction: Direction,
}

impl RangeQuery {
    pub fn first(limit: usize) -> Self {
        Self {
            end_at: None,
            limit,
            direction: Direction::First,
        }
    }

    pub fn last(limit: usize) -> Self {
        Self {
            end_at: None,
            limit,
            direction: Direction::Last,
        }
    }

    /// Restrict the query to keys less than or equal to `key`.
    pub fn ending_at(mut self, key: impl Into<String>) -> Self {
        self.end_at = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    collection: String,
    key: Option<String>,
    field: Vec<String>,
}

impl StorePath {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: None,
            field: Vec::new(),
        }
    }

    pub fn record(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: Some(key.into()),
            field: Vec::new(),
        }
    }

    /// Descend one level: a collection becomes a record, a record becomes one
    /// of its fields.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut path = self.clone();
        if path.key.is_none() {
            path.key = Some(segment.into());
        } else {
            path.field.push(segment.into());
        }
        path
    }

    pub fn users() -> Self {
        Self::collection(USERS_ROOT)
    }

    pub fn user(uid: &str) -> Self {
        Self::users().child(uid)
    }

    pub fn channels() -> Self {
        Self::collection(CHANNELS_ROOT)
    }

    pub fn channel(channel_id: &str) -> Self {
        Self::channels().child(channel_id)
    }

    pub fn channel_messages(channel_id: &str) -> Self {
        Self::collection(format!("{}/{}", CHANNEL_MESSAGES_ROOT, channel_id))
    }

    pub fn message(channel_id: &str, message_id: &str) -> Self {
        Self::channel_messages(channel_id).child(message_id)
    }

    pub fn reaction_count(channel_id: &str, message_id: &str, emoji: &str) -> Self {
        Self::message(channel_id, message_id)
            .child(REACTIONS_FIELD)
            .child(emoji)
    }

    pub fn user_reaction(channel_id: &str, message_id: &str, user_id: &str) -> Self {
        Self::message(channel_id, message_id)
            .child(USER_REACTIONS_FIELD)
            .child(user_id)
    }

    /// Per-user index of conversations; each value is the unread counter.
    pub fn user_channels(uid: &str) -> Self {
        Self::collection(format!("{}/{}", USER_CHANNELS_ROOT, uid))
    }

    pub fn unread_counter(uid: &str, channel_id: &str) -> Self {
        Self::user_channels(uid).child(channel_id)
    }

    pub fn user_direct_channels(uid: &str) -> Self {
        Self::collection(format!("{}/{}", USER_DIRECT_CHANNELS_ROOT, uid))
    }

    pub fn direct_channel(uid: &str, partner_id: &str) -> Self {
        Self::user_direct_channels(uid).child(partner_id)
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn field_segments(&self) -> &[String] {
        &self.field
    }

    pub fn is_collection(&self) -> bool {
        self.key.is_none()
    }

    /// The record key, for operations that address a single record.
    pub fn require_key(&self) -> Result<&str, StoreError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| StoreError::InvalidPath(self.to_string()))?;
        parley_shared::validation::validate_key(key)
            .map_err(|_| StoreError::InvalidPath(self.to_string()))?;
        Ok(key)
    }

    pub fn require_collection(&self) -> Result<&str, StoreError> {
        if self.key.is_some() {
            return Err(StoreError::InvalidPath(self.to_string()));
        }
        Ok(&self.collection)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.collection)?;
        if let Some(key) = &self.key {
            write!(f, "/{}", key)?;
        }
        for segment in &self.field {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// The backend the chat pipeline talks to. Implementations must make
/// [`RemoteMessageStore::transact`] atomic with respect to every other write
/// on the same path.
#[async_trait]
pub trait RemoteMessageStore: Send + Sync {
    /// Generate a new record key that sorts after every key this handle
    /// generated before.
    fn push_key(&self) -> String;

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    async fn range_query(
        &self,
        path: &StorePath,
        query: RangeQuery,
    ) -> Result<Vec<Record>, StoreError>;

    /// Stream of records created in the collection at `path`.
    ///
    /// Records that already exist with a key greater than `start_after` (all
    /// existing records when `None`) are delivered first, so the stream may
    /// repeat records the caller already holds.
    async fn subscribe_child_added(
        &self,
        path: &StorePath,
        start_after: Option<String>,
    ) -> Result<ChildAdded, StoreError>;

    /// Atomic read-modify-write. Returns the value that was written.
    async fn transact(
        &self,
        path: &StorePath,
        apply: &ApplyFn,
    ) -> Result<Value, StoreError>;

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Merge `fields` into the object at `path`.
    async fn update(&self, path: &StorePath, fields: Map<String, Value>)
        -> Result<(), StoreError>;
}
