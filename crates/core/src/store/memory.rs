use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    merge_fields, read_field, write_field, ApplyFn, Direction, PushIdGenerator, RangeQuery, Record,
    RemoteMessageStore, StorePath,
};
use crate::error::StoreError;
use crate::live::{ChildAdded, LiveHub};

/// Store kept entirely in process memory. Every write holds one lock, so
/// transactions never conflict.
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    hub: Arc<LiveHub>,
    ids: PushIdGenerator,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            hub: Arc::new(LiveHub::new()),
            ids: PushIdGenerator::new(),
        }
    }

    pub fn hub(&self) -> &Arc<LiveHub> {
        &self.hub
    }

    pub async fn record_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    async fn write<F>(&self, path: &StorePath, apply: F) -> Result<Value, StoreError>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let key = path.require_key()?;
        let field = path.field_segments();

        let mut collections = self.collections.lock().await;
        let records = collections
            .entry(path.collection_name().to_string())
            .or_default();

        let created = !records.contains_key(key);
        let document = records.entry(key.to_string()).or_insert(Value::Null);
        let applied = apply(read_field(document, field));
        write_field(document, field, applied.clone());

        if created {
            let record = Record {
                key: key.to_string(),
                value: document.clone(),
            };
            // Published under the lock so subscribers see creations in order.
            self.hub.publish(path.collection_name(), &record).await;
        }

        Ok(applied)
    }
}

#[async_trait]
impl RemoteMessageStore for MemoryStore {
    fn push_key(&self) -> String {
        self.ids.generate()
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let key = path.require_key()?;
        let collections = self.collections.lock().await;
        Ok(collections
            .get(path.collection_name())
            .and_then(|records| records.get(key))
            .and_then(|document| read_field(document, path.field_segments()))
            .cloned())
    }

    async fn range_query(
        &self,
        path: &StorePath,
        query: RangeQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let collection = path.require_collection()?;
        let collections = self.collections.lock().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let upper = match &query.end_at {
            Some(end) => Bound::Included(end.as_str()),
            None => Bound::Unbounded,
        };
        let range = records.range::<str, _>((Bound::Unbounded, upper));
        let to_record = |(key, value): (&String, &Value)| Record {
            key: key.clone(),
            value: value.clone(),
        };

        let items = match query.direction {
            Direction::First => range.take(query.limit).map(to_record).collect(),
            Direction::Last => {
                let mut items: Vec<Record> =
                    range.rev().take(query.limit).map(to_record).collect();
                items.reverse();
                items
            }
        };
        Ok(items)
    }

    async fn subscribe_child_added(
        &self,
        path: &StorePath,
        start_after: Option<String>,
    ) -> Result<ChildAdded, StoreError> {
        let collection = path.require_collection()?;
        let (id, rx) = self.hub.register(collection).await;

        let collections = self.collections.lock().await;
        let backlog = collections
            .get(collection)
            .map(|records| {
                let lower = match &start_after {
                    Some(key) => Bound::Excluded(key.as_str()),
                    None => Bound::Unbounded,
                };
                records
                    .range::<str, _>((lower, Bound::Unbounded))
                    .map(|(key, value)| Record {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ChildAdded::new(id, backlog, rx, Arc::downgrade(&self.hub)))
    }

    async fn transact(
        &self,
        path: &StorePath,
        apply: &ApplyFn,
    ) -> Result<Value, StoreError> {
        self.write(path, apply).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.write(path, |_| value).await?;
        Ok(())
    }

    async fn update(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.write(path, |current| merge_fields(current, &fields))
            .await?;
        Ok(())
    }
}
