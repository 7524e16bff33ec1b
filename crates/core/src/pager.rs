use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{decode_message, ChatMessage, MessageId};
use crate::store::{RangeQuery, RemoteMessageStore, StorePath};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    /// Decoded messages, oldest first. Never contains the cursor message.
    pub messages: Vec<ChatMessage>,
    /// Oldest key of the raw fetch, before the cursor was dropped or
    /// malformed records were skipped.
    pub new_cursor: Option<MessageId>,
}

/// Reads a conversation backwards in fixed-size windows.
#[derive(Clone)]
pub struct CursorPager {
    store: Arc<dyn RemoteMessageStore>,
}

impl CursorPager {
    pub fn new(store: Arc<dyn RemoteMessageStore>) -> Self {
        Self { store }
    }

    /// Fetch the newest `page_size` messages, or, with a cursor, the
    /// `page_size` records ending at the cursor minus the cursor itself.
    pub async fn fetch_page(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<PageResult, StoreError> {
        let mut query = RangeQuery::last(page_size);
        if let Some(cursor) = cursor {
            query = query.ending_at(cursor);
        }

        let records = self
            .store
            .range_query(&StorePath::channel_messages(channel_id), query)
            .await?;

        let new_cursor = records.first().map(|r| r.key.clone());

        let mut messages: Vec<ChatMessage> = records
            .iter()
            .filter(|r| Some(r.key.as_str()) != cursor)
            .filter_map(|r| match decode_message(r) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("Skipping message in {}: {}", channel_id, e);
                    None
                }
            })
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        tracing::debug!(
            "Fetched {} of {} records from {} (cursor {:?})",
            messages.len(),
            records.len(),
            channel_id,
            cursor
        );

        Ok(PageResult {
            messages,
            new_cursor,
        })
    }

    /// Key of the first message ever written to the conversation.
    pub async fn fetch_first_message_id(
        &self,
        channel_id: &str,
    ) -> Result<Option<MessageId>, StoreError> {
        let records = self
            .store
            .range_query(&StorePath::channel_messages(channel_id), RangeQuery::first(1))
            .await?;
        Ok(records.into_iter().next().map(|r| r.key))
    }
}
