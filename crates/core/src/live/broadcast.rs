use super::{LiveHub, SubscriberId};
use crate::store::Record;

impl LiveHub {
    /// Deliver `record` to every subscriber of `collection`. Subscribers whose
    /// stream was dropped are removed. Returns the number of deliveries.
    pub async fn publish(&self, collection: &str, record: &Record) -> usize {
        let mut closed: Vec<SubscriberId> = Vec::new();
        let mut delivered = 0;

        {
            let subs = self.collection_subs.read().await;
            let subscribers = self.subscribers.read().await;

            if let Some(subscriber_ids) = subs.get(collection) {
                for &sid in subscriber_ids {
                    if let Some(subscriber) = subscribers.get(&sid) {
                        if subscriber.tx.send(record.clone()).is_ok() {
                            delivered += 1;
                        } else {
                            closed.push(sid);
                        }
                    }
                }
            }
        }

        for sid in closed {
            tracing::debug!("Pruning closed live subscriber {} on {}", sid, collection);
            self.unsubscribe(sid).await;
        }

        delivered
    }
}
