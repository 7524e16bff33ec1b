mod broadcast;
mod feed;

pub use feed::{ChildAdded, FeedCloser};

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};

use crate::store::Record;

pub type SubscriberId = u64;

pub struct LiveSubscriber {
    pub collection: String,
    pub tx: mpsc::UnboundedSender<Record>,
}

/// Fan-out of child-added events to the subscribers of each collection.
pub struct LiveHub {
    next_id: RwLock<u64>,
    pub subscribers: RwLock<HashMap<SubscriberId, LiveSubscriber>>,
    pub collection_subs: RwLock<HashMap<String, HashSet<SubscriberId>>>,
}

impl Default for LiveHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveHub {
    pub fn new() -> Self {
        Self {
            next_id: RwLock::new(1),
            subscribers: RwLock::new(HashMap::new()),
            collection_subs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn next_subscriber_id(&self) -> SubscriberId {
        let mut id = self.next_id.write().await;
        let current = *id;
        *id += 1;
        current
    }

    /// Register a subscriber before any backlog is read, so nothing created
    /// in between is missed.
    pub async fn register(
        &self,
        collection: &str,
    ) -> (SubscriberId, mpsc::UnboundedReceiver<Record>) {
        let id = self.next_subscriber_id().await;
        let (tx, rx) = mpsc::unbounded_channel();

        self.subscribers.write().await.insert(
            id,
            LiveSubscriber {
                collection: collection.to_string(),
                tx,
            },
        );
        self.collection_subs
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id);

        (id, rx)
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> Option<LiveSubscriber> {
        let subscriber = self.subscribers.write().await.remove(&id)?;

        let mut subs = self.collection_subs.write().await;
        if let Some(set) = subs.get_mut(&subscriber.collection) {
            set.remove(&id);
            if set.is_empty() {
                subs.remove(&subscriber.collection);
            }
        }

        Some(subscriber)
    }

    pub async fn subscriber_count(&self, collection: &str) -> usize {
        self.collection_subs
            .read()
            .await
            .get(collection)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}
