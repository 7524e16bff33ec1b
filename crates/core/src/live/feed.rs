use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::{LiveHub, SubscriberId};
use crate::store::Record;

/// A cancellable child-added subscription. Dropping it also ends the
/// subscription; the hub prunes it on the next publish unless a
/// [`FeedCloser`] removes it first.
pub struct ChildAdded {
    id: SubscriberId,
    backlog: VecDeque<Record>,
    rx: mpsc::UnboundedReceiver<Record>,
    hub: Weak<LiveHub>,
}

impl ChildAdded {
    pub(crate) fn new(
        id: SubscriberId,
        backlog: Vec<Record>,
        rx: mpsc::UnboundedReceiver<Record>,
        hub: Weak<LiveHub>,
    ) -> Self {
        Self {
            id,
            backlog: backlog.into(),
            rx,
            hub,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Handle that can end this subscription from outside the task reading it.
    pub fn closer(&self) -> FeedCloser {
        FeedCloser {
            id: self.id,
            hub: self.hub.clone(),
        }
    }

    pub async fn recv(&mut self) -> Option<Record> {
        if let Some(record) = self.backlog.pop_front() {
            return Some(record);
        }
        self.rx.recv().await
    }

    pub async fn cancel(mut self) {
        self.rx.close();
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id).await;
        }
    }
}

#[derive(Clone)]
pub struct FeedCloser {
    id: SubscriberId,
    hub: Weak<LiveHub>,
}

impl FeedCloser {
    pub async fn close(self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id).await;
        }
    }
}

impl Stream for ChildAdded {
    type Item = Record;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Record>> {
        let this = self.get_mut();
        if let Some(record) = this.backlog.pop_front() {
            return Poll::Ready(Some(record));
        }
        this.rx.poll_recv(cx)
    }
}
