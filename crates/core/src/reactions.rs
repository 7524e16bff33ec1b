use std::sync::Arc;

use parley_shared::validation::validate_reaction_emoji;

use crate::error::{ChatError, Result};
use crate::models::{ChatMessage, MessageId};
use crate::store::{RemoteMessageStore, StorePath};
use crate::unread::increment_count;

/// What the store accepted for one reaction; applied to the in-memory
/// message once confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionReceipt {
    pub message_id: MessageId,
    pub emoji: String,
    pub user_id: String,
    pub count: u64,
}

#[derive(Clone)]
pub struct ReactionAggregator {
    store: Arc<dyn RemoteMessageStore>,
}

impl ReactionAggregator {
    pub fn new(store: Arc<dyn RemoteMessageStore>) -> Self {
        Self { store }
    }

    /// Count the reaction, then record it as the user's latest.
    ///
    /// The two writes are not atomic: if the second fails the count stays
    /// incremented. A user switching emoji does not decrement the old one.
    pub async fn add_reaction(
        &self,
        message_id: &str,
        channel_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> Result<ReactionReceipt> {
        validate_reaction_emoji(emoji).map_err(ChatError::Validation)?;

        if self
            .store
            .get(&StorePath::message(channel_id, message_id))
            .await?
            .is_none()
        {
            return Err(ChatError::NotFound(format!("message {}", message_id)));
        }

        let count_path = StorePath::reaction_count(channel_id, message_id, emoji);
        let count = self
            .store
            .transact(&count_path, &increment_count)
            .await?
            .as_u64()
            .unwrap_or(0);

        let user_path = StorePath::user_reaction(channel_id, message_id, user_id);
        if let Err(e) = self.store.set(&user_path, emoji.into()).await {
            tracing::error!(
                "Reaction count for {} was incremented but {} failed: {}",
                message_id,
                user_path,
                e
            );
            return Err(e.into());
        }

        tracing::debug!("{} reacted {} to {} (count {})", user_id, emoji, message_id, count);
        Ok(ReactionReceipt {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            user_id: user_id.to_string(),
            count,
        })
    }

    /// Reconcile a confirmed reaction into the in-memory message.
    pub fn apply(message: &mut ChatMessage, receipt: &ReactionReceipt) {
        message
            .reaction_counts
            .insert(receipt.emoji.clone(), receipt.count);
        message
            .user_reactions
            .insert(receipt.user_id.clone(), receipt.emoji.clone());
    }
}
