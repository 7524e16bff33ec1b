//! One open conversation: the ordered view, the pagination cursor and the
//! live subscription.

mod live;
mod send;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{Config, MIN_PAGE_SIZE};
use crate::directory::UserDirectory;
use crate::error::{ChatError, Result};
use crate::live::FeedCloser;
use crate::merger::OrderedMessages;
use crate::models::{Channel, ChatMessage, MessageId};
use crate::pager::CursorPager;
use crate::reactions::ReactionAggregator;
use crate::store::RemoteMessageStore;
use crate::unread::UnreadCounterService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    LoadingMembers,
    LoadingFirstPage,
    Live,
    Disposed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::LoadingMembers => "loading_members",
            SessionState::LoadingFirstPage => "loading_first_page",
            SessionState::Live => "live",
            SessionState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

struct SessionCore {
    state: SessionState,
    channel: Channel,
    messages: OrderedMessages,
    cursor: Option<MessageId>,
    first_message_id: Option<MessageId>,
    first_page_loaded: bool,
    sentinel_fetched: bool,
    live_opened: bool,
}

pub struct ChatRoomSession {
    store: Arc<dyn RemoteMessageStore>,
    config: Config,
    viewer_id: String,
    channel_id: String,
    pager: CursorPager,
    unread: UnreadCounterService,
    reactions: ReactionAggregator,
    users: UserDirectory,
    core: Mutex<SessionCore>,
    // Held for the whole of every historical load so splices never interleave.
    paginate_lock: Mutex<()>,
    disposed: AtomicBool,
    messages_tx: watch::Sender<Vec<ChatMessage>>,
    state_tx: watch::Sender<SessionState>,
    live_task: StdMutex<Option<(JoinHandle<()>, FeedCloser)>>,
}

impl ChatRoomSession {
    /// Create a session without touching the store.
    pub fn new(
        store: Arc<dyn RemoteMessageStore>,
        mut config: Config,
        channel: Channel,
        viewer_id: impl Into<String>,
    ) -> SessionHandle {
        // A cursor page must hold at least one record besides the cursor
        if config.page_size < MIN_PAGE_SIZE {
            tracing::warn!(
                "Page size {} is too small, using {}",
                config.page_size,
                MIN_PAGE_SIZE
            );
            config.page_size = MIN_PAGE_SIZE;
        }
        let (messages_tx, _) = watch::channel(Vec::new());
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);

        let session = ChatRoomSession {
            pager: CursorPager::new(store.clone()),
            unread: UnreadCounterService::new(store.clone()),
            reactions: ReactionAggregator::new(store.clone()),
            users: UserDirectory::new(store.clone()),
            store,
            config,
            viewer_id: viewer_id.into(),
            channel_id: channel.id.clone(),
            core: Mutex::new(SessionCore {
                state: SessionState::Uninitialized,
                channel,
                messages: OrderedMessages::new(),
                cursor: None,
                first_message_id: None,
                first_page_loaded: false,
                sentinel_fetched: false,
                live_opened: false,
            }),
            paginate_lock: Mutex::new(()),
            disposed: AtomicBool::new(false),
            messages_tx,
            state_tx,
            live_task: StdMutex::new(None),
        };

        SessionHandle {
            inner: Arc::new(session),
        }
    }

    /// Create a session and run it up to `Live`.
    pub async fn open(
        store: Arc<dyn RemoteMessageStore>,
        config: Config,
        channel: Channel,
        viewer_id: impl Into<String>,
    ) -> Result<SessionHandle> {
        let handle = Self::new(store, config, channel, viewer_id);
        handle.start().await?;
        Ok(handle)
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ChatError::Disposed);
        }
        Ok(())
    }

    fn set_state(&self, core: &mut SessionCore, state: SessionState) {
        if core.state != state {
            tracing::info!("Session {}: {} -> {}", self.channel_id, core.state, state);
            core.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn publish(&self, core: &SessionCore) {
        self.messages_tx.send_replace(core.messages.to_vec());
    }

    /// Attach sender profiles from the member list.
    fn attribute(core: &SessionCore, messages: &mut [ChatMessage]) {
        for message in messages {
            if message.sender.is_none() {
                message.sender = core.channel.member(&message.sender_id).cloned();
            }
        }
    }

    async fn resolve_members(&self) -> Result<()> {
        let missing = {
            let core = self.core.lock().await;
            core.channel.missing_member_ids()
        };

        let fetched = self.users.get_users(&missing).await?;
        self.ensure_active()?;

        let mut core = self.core.lock().await;
        for user in fetched {
            if core.channel.member(&user.uid).is_none() {
                core.channel.members.push(user);
            }
        }
        if !core.channel.all_members_fetched() {
            tracing::warn!(
                "Session {}: unresolved members {:?}",
                self.channel_id,
                core.channel.missing_member_ids()
            );
        }
        self.set_state(&mut core, SessionState::LoadingFirstPage);
        Ok(())
    }

    async fn load_first_page(&self) -> Result<()> {
        let page = self
            .pager
            .fetch_page(&self.channel_id, None, self.config.page_size)
            .await?;
        self.ensure_active()?;

        let mut core = self.core.lock().await;
        let mut batch = page.messages;
        Self::attribute(&core, &mut batch);
        core.messages.merge_historical(batch)?;
        core.cursor = page.new_cursor;
        core.first_page_loaded = true;
        self.publish(&core);
        Ok(())
    }

    async fn load_sentinel(&self) -> Result<()> {
        let first = self.pager.fetch_first_message_id(&self.channel_id).await?;
        self.ensure_active()?;

        let mut core = self.core.lock().await;
        core.first_message_id = first;
        core.sentinel_fetched = true;
        Ok(())
    }
}

/// Owning handle to a [`ChatRoomSession`]. Dropping it disposes the session.
pub struct SessionHandle {
    inner: Arc<ChatRoomSession>,
}

impl SessionHandle {
    /// Drive the session towards `Live`. Steps that already completed are
    /// not repeated, so a failed start can be retried.
    pub async fn start(&self) -> Result<()> {
        let session = &self.inner;
        let _guard = session.paginate_lock.lock().await;
        session.ensure_active()?;

        let state = {
            let mut core = session.core.lock().await;
            if core.state == SessionState::Uninitialized {
                let next = if core.channel.all_members_fetched() {
                    SessionState::LoadingFirstPage
                } else {
                    SessionState::LoadingMembers
                };
                session.set_state(&mut core, next);
            }
            core.state
        };

        if state == SessionState::Live {
            return Ok(());
        }
        if state == SessionState::LoadingMembers {
            session.resolve_members().await?;
        }

        let (first_page_loaded, sentinel_fetched) = {
            let core = session.core.lock().await;
            (core.first_page_loaded, core.sentinel_fetched)
        };
        if !first_page_loaded {
            session.load_first_page().await?;
        }
        if !sentinel_fetched {
            session.load_sentinel().await?;
        }

        self.open_live().await?;

        {
            let mut core = session.core.lock().await;
            session.ensure_active()?;
            session.set_state(&mut core, SessionState::Live);
        }

        session.unread.reset(&session.channel_id, &session.viewer_id).await;
        Ok(())
    }

    /// Load the next older page. Returns `true` once the first message of
    /// the conversation is loaded; after that no store call is made.
    pub async fn paginate_older(&self) -> Result<bool> {
        let session = &self.inner;
        let _guard = session.paginate_lock.lock().await;
        session.ensure_active()?;

        let cursor = {
            let core = session.core.lock().await;
            if core.state != SessionState::Live {
                return Err(ChatError::NotLive(core.state.to_string()));
            }
            match &core.cursor {
                // empty first page: everything newer arrives live
                None => return Ok(true),
                Some(cursor) if core.first_message_id.as_ref() == Some(cursor) => return Ok(true),
                Some(cursor) => cursor.clone(),
            }
        };

        let page = session
            .pager
            .fetch_page(&session.channel_id, Some(&cursor), session.config.page_size)
            .await?;
        session.ensure_active()?;

        let mut core = session.core.lock().await;
        let mut batch: Vec<ChatMessage> = page
            .messages
            .into_iter()
            .filter(|m| !core.messages.contains(&m.id))
            .collect();
        ChatRoomSession::attribute(&core, &mut batch);
        core.messages.merge_historical(batch)?;
        if let Some(new_cursor) = page.new_cursor {
            core.cursor = Some(new_cursor);
        }
        session.publish(&core);

        Ok(core.cursor.is_some() && core.cursor == core.first_message_id)
    }

    /// Whether an older page may still exist.
    pub async fn is_paginatable(&self) -> bool {
        let core = self.inner.core.lock().await;
        core.state == SessionState::Live
            && core.cursor.is_some()
            && core.cursor != core.first_message_id
    }

    /// Push-updated snapshot of the ordered list.
    pub fn messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.inner.messages_tx.subscribe()
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.inner.messages_tx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn channel_id(&self) -> &str {
        &self.inner.channel_id
    }

    pub fn viewer_id(&self) -> &str {
        &self.inner.viewer_id
    }

    pub async fn channel(&self) -> Channel {
        self.inner.core.lock().await.channel.clone()
    }

    pub async fn cursor(&self) -> Option<MessageId> {
        self.inner.core.lock().await.cursor.clone()
    }

    pub async fn first_message_id(&self) -> Option<MessageId> {
        self.inner.core.lock().await.first_message_id.clone()
    }

    /// Stop the live subscription and discard all state. Idempotent.
    pub async fn dispose(&self) {
        if !self.inner.shutdown() {
            return;
        }
        if let Some(closer) = self.inner.stop_live() {
            closer.close().await;
        }

        let mut core = self.inner.core.lock().await;
        core.messages.clear();
        core.cursor = None;
        core.first_message_id = None;
        core.state = SessionState::Disposed;
        tracing::info!("Session {} disposed", self.inner.channel_id);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl ChatRoomSession {
    /// Flip the disposed flag and stop background work. Returns `false` if
    /// the session was already disposed.
    fn shutdown(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.messages_tx.send_replace(Vec::new());
        self.state_tx.send_replace(SessionState::Disposed);
        true
    }

    /// Abort the live task. The returned closer removes its subscription
    /// from the hub.
    fn stop_live(&self) -> Option<FeedCloser> {
        let live = match self.live_task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        live.map(|(task, closer)| {
            task.abort();
            closer
        })
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.inner.shutdown() {
            return;
        }
        if let Some(closer) = self.inner.stop_live() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(closer.close());
                }
                Err(_) => tracing::debug!(
                    "Session {} dropped outside a runtime; subscription pruned on next publish",
                    self.inner.channel_id
                ),
            }
        }
    }
}
