use std::sync::Arc;

use parley_shared::validation::{validate_caption, validate_message_text};

use super::{ChatRoomSession, SessionHandle};
use crate::error::{ChatError, Result};
use crate::models::{last_message_fields, MediaBody, MessageId, MessageKind, OutgoingMessage};
use crate::reactions::{ReactionAggregator, ReactionReceipt};
use crate::store::StorePath;

impl SessionHandle {
    /// Write a text message. The message reaches the list through the live
    /// stream, not from here.
    pub async fn send_text(&self, text: &str) -> Result<MessageId> {
        validate_message_text(text).map_err(ChatError::Validation)?;
        self.send(OutgoingMessage::text(self.viewer_id(), text)).await
    }

    pub async fn send_media(
        &self,
        kind: MessageKind,
        caption: &str,
        media: MediaBody,
    ) -> Result<MessageId> {
        if !kind.is_media() {
            return Err(ChatError::Validation(format!(
                "{} is not a media message type",
                kind.wire_name()
            )));
        }
        if let Some(field) = media.missing_for(kind) {
            return Err(ChatError::Validation(format!(
                "{} message requires {}",
                kind.wire_name(),
                field
            )));
        }
        validate_caption(caption).map_err(ChatError::Validation)?;

        self.send(OutgoingMessage::media(self.viewer_id(), kind, caption, media))
            .await
    }

    async fn send(&self, message: OutgoingMessage) -> Result<MessageId> {
        let session = &self.inner;
        session.ensure_active()?;

        let member_ids = session.core.lock().await.channel.member_ids.clone();

        session
            .store
            .update(
                &StorePath::channel(&session.channel_id),
                last_message_fields(&message.text, message.kind, message.timestamp),
            )
            .await?;

        let message_id = session.store.push_key();
        session
            .store
            .set(
                &StorePath::message(&session.channel_id, &message_id),
                message.to_record(),
            )
            .await?;

        session
            .unread
            .increment_for_recipients(&session.channel_id, &member_ids, &session.viewer_id)
            .await;

        tracing::debug!(
            "Sent {} message {} to {}",
            message.kind.wire_name(),
            message_id,
            session.channel_id
        );
        Ok(message_id)
    }

    /// React to a message as the viewer. Returns the new count; the list is
    /// updated after the configured delay.
    pub async fn add_reaction(&self, message_id: &str, emoji: &str) -> Result<u64> {
        let session = &self.inner;
        session.ensure_active()?;

        let receipt = session
            .reactions
            .add_reaction(message_id, &session.channel_id, emoji, &session.viewer_id)
            .await?;
        let count = receipt.count;

        let weak = Arc::downgrade(&self.inner);
        let delay = session.config.reaction_apply_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(session) = weak.upgrade() {
                session.apply_reaction(&receipt).await;
            }
        });

        Ok(count)
    }
}

impl ChatRoomSession {
    async fn apply_reaction(&self, receipt: &ReactionReceipt) {
        let mut core = self.core.lock().await;
        if self.is_disposed() {
            return;
        }

        let applied = match core.messages.get_mut(&receipt.message_id) {
            Some(message) => {
                ReactionAggregator::apply(message, receipt);
                true
            }
            None => false,
        };
        if applied {
            self.publish(&core);
        } else {
            tracing::debug!("Reaction target {} is not loaded", receipt.message_id);
        }
    }
}
