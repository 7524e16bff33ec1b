use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{RemoteMessageStore, StorePath};

/// Result of a counter write. Failures never reach the user; the counter is
/// simply left stale until the next successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    Applied(u64),
    Stale,
}

impl CounterOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CounterOutcome::Applied(_))
    }
}

/// Per-user, per-conversation unread counters kept under `user-channels`.
#[derive(Clone)]
pub struct UnreadCounterService {
    store: Arc<dyn RemoteMessageStore>,
}

impl UnreadCounterService {
    pub fn new(store: Arc<dyn RemoteMessageStore>) -> Self {
        Self { store }
    }

    pub async fn increment(&self, channel_id: &str, recipient_id: &str) -> CounterOutcome {
        let path = StorePath::unread_counter(recipient_id, channel_id);
        match self.store.transact(&path, &increment_count).await {
            Ok(value) => CounterOutcome::Applied(value.as_u64().unwrap_or(0)),
            Err(e) => {
                tracing::warn!("Failed to increment unread counter {}: {}", path, e);
                CounterOutcome::Stale
            }
        }
    }

    /// Increment the counter of every member except the sender.
    pub async fn increment_for_recipients(
        &self,
        channel_id: &str,
        member_ids: &[String],
        sender_id: &str,
    ) -> Vec<(String, CounterOutcome)> {
        let recipients: Vec<&String> = member_ids.iter().filter(|uid| *uid != sender_id).collect();
        let outcomes = join_all(
            recipients
                .iter()
                .map(|uid| self.increment(channel_id, uid.as_str())),
        )
        .await;

        recipients.into_iter().cloned().zip(outcomes).collect()
    }

    pub async fn reset(&self, channel_id: &str, viewer_id: &str) -> CounterOutcome {
        let path = StorePath::unread_counter(viewer_id, channel_id);
        match self.store.set(&path, Value::from(0u64)).await {
            Ok(()) => CounterOutcome::Applied(0),
            Err(e) => {
                tracing::warn!("Failed to reset unread counter {}: {}", path, e);
                CounterOutcome::Stale
            }
        }
    }

    pub async fn unread_count(&self, channel_id: &str, user_id: &str) -> Result<u64, StoreError> {
        let value = self
            .store
            .get(&StorePath::unread_counter(user_id, channel_id))
            .await?;
        Ok(value.and_then(|v| v.as_u64()).unwrap_or(0))
    }
}

/// Absent or non-numeric counts as zero.
pub(crate) fn increment_count(current: Option<&Value>) -> Value {
    let count = current.and_then(Value::as_u64).unwrap_or(0);
    Value::from(count.saturating_add(1))
}
