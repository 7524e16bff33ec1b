//! The client-side ordered view of a conversation.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::ChatError;
use crate::models::{ChatMessage, MessageId};

/// Messages ordered by timestamp, oldest first, with no repeated ids.
#[derive(Debug, Default, Clone)]
pub struct OrderedMessages {
    messages: Vec<ChatMessage>,
    ids: HashSet<MessageId>,
    // Oldest message that arrived through a historical merge. Live messages
    // with skewed clocks may sit before it.
    floor: Option<(DateTime<Utc>, MessageId)>,
}

impl OrderedMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        if !self.ids.contains(id) {
            return None;
        }
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        if !self.ids.contains(id) {
            return None;
        }
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn oldest_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.id.as_str())
    }

    pub fn newest_id(&self) -> Option<&str> {
        self.messages.last().map(|m| m.id.as_str())
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.floor = None;
    }

    /// Prepend an older batch.
    ///
    /// The batch must be sorted, share no id with the list or with itself, and
    /// end no later than the oldest historically merged message. Anything else
    /// is a caller bug: it panics in debug builds and is rejected, leaving the
    /// list untouched, in release builds. Live messages older than the batch
    /// stay in timestamp order.
    pub fn merge_historical(&mut self, batch: Vec<ChatMessage>) -> Result<usize, ChatError> {
        if let Err(violation) = self.check_historical(&batch) {
            debug_assert!(false, "merge_historical precondition violated: {}", violation);
            tracing::error!("Rejected historical batch: {}", violation);
            return Err(ChatError::DuplicateMergeViolation(violation));
        }

        let added = batch.len();
        if let Some(oldest) = batch.first() {
            self.floor = Some((oldest.timestamp, oldest.id.clone()));
        }
        self.ids.extend(batch.iter().map(|m| m.id.clone()));

        let mut rest = std::mem::take(&mut self.messages).into_iter().peekable();
        let mut merged = Vec::with_capacity(rest.len() + added);
        for message in batch {
            while let Some(earlier) = rest.next_if(|m| m.timestamp < message.timestamp) {
                merged.push(earlier);
            }
            merged.push(message);
        }
        merged.extend(rest);
        self.messages = merged;

        tracing::debug!("Merged {} historical messages ({} total)", added, self.messages.len());
        Ok(added)
    }

    fn check_historical(&self, batch: &[ChatMessage]) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(batch.len());
        for message in batch {
            if self.ids.contains(&message.id) {
                return Err(format!("message {} is already in the list", message.id));
            }
            if !seen.insert(message.id.as_str()) {
                return Err(format!("message {} appears twice in the batch", message.id));
            }
        }

        if batch.windows(2).any(|pair| pair[0].timestamp > pair[1].timestamp) {
            return Err("batch is not ordered by timestamp".into());
        }

        if let (Some(last), Some((floor, floor_id))) = (batch.last(), &self.floor) {
            if last.timestamp > *floor {
                return Err(format!(
                    "message {} is newer than the oldest loaded message {}",
                    last.id, floor_id
                ));
            }
        }
        Ok(())
    }

    /// Add a message from the live stream. Returns `false` if the id was
    /// already present. A message older than the tail is inserted at its
    /// ordered position.
    pub fn merge_live(&mut self, message: ChatMessage) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }

        self.ids.insert(message.id.clone());
        let at = self
            .messages
            .partition_point(|m| m.timestamp <= message.timestamp);
        if at < self.messages.len() {
            tracing::debug!("Live message {} arrived out of order", message.id);
        }
        self.messages.insert(at, message);
        true
    }
}
