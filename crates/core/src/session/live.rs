use std::sync::{Arc, Weak};

use super::{ChatRoomSession, SessionHandle};
use crate::error::{ChatError, Result};
use crate::live::ChildAdded;
use crate::models::decode_message;
use crate::store::{Record, StorePath};

impl SessionHandle {
    /// Subscribe to new messages, once per session. Records newer than the
    /// newest loaded key are replayed first.
    pub(super) async fn open_live(&self) -> Result<()> {
        let session = &self.inner;
        let start_after = {
            let core = session.core.lock().await;
            if core.live_opened {
                return Ok(());
            }
            core.messages
                .as_slice()
                .iter()
                .map(|m| m.id.as_str())
                .max()
                .map(str::to_string)
        };

        let feed = session
            .store
            .subscribe_child_added(&StorePath::channel_messages(&session.channel_id), start_after)
            .await?;
        if session.is_disposed() {
            feed.cancel().await;
            return Err(ChatError::Disposed);
        }

        let mut core = session.core.lock().await;
        core.live_opened = true;
        let closer = feed.closer();
        let task = tokio::spawn(run(Arc::downgrade(&self.inner), feed));
        match session.live_task.lock() {
            Ok(mut slot) => *slot = Some((task, closer)),
            Err(poisoned) => *poisoned.into_inner() = Some((task, closer)),
        }
        drop(core);

        // dispose may have run before the task was stored
        if session.is_disposed() {
            if let Some(closer) = session.stop_live() {
                closer.close().await;
            }
            return Err(ChatError::Disposed);
        }

        tracing::info!("Session {}: live subscription opened", session.channel_id);
        Ok(())
    }
}

async fn run(session: Weak<ChatRoomSession>, mut feed: ChildAdded) {
    while let Some(record) = feed.recv().await {
        let Some(active) = session.upgrade() else {
            break;
        };
        if active.is_disposed() {
            break;
        }
        active.receive_live(record).await;
    }
    feed.cancel().await;
}

impl ChatRoomSession {
    async fn receive_live(&self, record: Record) {
        let mut message = match decode_message(&record) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Skipping live message in {}: {}", self.channel_id, e);
                return;
            }
        };

        {
            let mut core = self.core.lock().await;
            if self.is_disposed() {
                return;
            }
            Self::attribute(&core, std::slice::from_mut(&mut message));
            let id = message.id.clone();
            if !core.messages.merge_live(message) {
                tracing::debug!("Live message {} already loaded", id);
                return;
            }
            self.publish(&core);
        }

        // the viewer has the conversation open
        self.unread.reset(&self.channel_id, &self.viewer_id).await;
    }
}
