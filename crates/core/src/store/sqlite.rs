use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use std::time::Duration;

use super::{
    merge_fields, read_field, write_field, ApplyFn, Direction, PushIdGenerator, RangeQuery, Record,
    RemoteMessageStore, StorePath,
};
use crate::error::StoreError;
use crate::live::{ChildAdded, LiveHub};

type Apply<'a> = &'a ApplyFn;

/// Store backed by the `nodes` table. Child-added events reach subscribers
/// of this handle (and of any handle sharing its hub).
pub struct SqliteStore {
    db: SqlitePool,
    hub: Arc<LiveHub>,
    ids: PushIdGenerator,
    max_retries: u32,
}

impl SqliteStore {
    pub fn new(db: SqlitePool, max_retries: u32) -> Self {
        Self::with_hub(db, Arc::new(LiveHub::new()), max_retries)
    }

    pub fn with_hub(db: SqlitePool, hub: Arc<LiveHub>, max_retries: u32) -> Self {
        Self {
            db,
            hub,
            ids: PushIdGenerator::new(),
            max_retries: max_retries.max(1),
        }
    }

    pub fn hub(&self) -> &Arc<LiveHub> {
        &self.hub
    }

    async fn read_modify_write(&self, path: &StorePath, apply: Apply<'_>) -> Result<Value, StoreError> {
        let key = path.require_key()?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self
                .try_read_modify_write(path.collection_name(), key, path.field_segments(), apply)
                .await
            {
                Ok((applied, created)) => {
                    if let Some(record) = created {
                        self.hub.publish(path.collection_name(), &record).await;
                    }
                    return Ok(applied);
                }
                Err(e) if is_busy(&e) && attempt < self.max_retries => {
                    tracing::debug!("Write conflict on {} (attempt {}), retrying", path, attempt);
                    tokio::time::sleep(Duration::from_millis(5 * attempt as u64)).await;
                }
                Err(e) if is_busy(&e) => {
                    tracing::error!("Giving up on {} after {} attempts: {}", path, attempt, e);
                    return Err(StoreError::Conflict {
                        path: path.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    tracing::error!("Write to {} failed: {:?}", path, e);
                    return Err(e.into());
                }
            }
        }
    }

    async fn try_read_modify_write(
        &self,
        collection: &str,
        key: &str,
        field: &[String],
        apply: Apply<'_>,
    ) -> Result<(Value, Option<Record>), sqlx::Error> {
        let mut conn = self.db.acquire().await?;

        // IMMEDIATE takes the write lock up front, so the read below cannot go
        // stale before the write.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match apply_in_transaction(&mut conn, collection, key, field, apply).await {
            Ok(outcome) => match sqlx::query("COMMIT").execute(&mut *conn).await {
                Ok(_) => Ok(outcome),
                Err(e) => {
                    sqlx::query("ROLLBACK").execute(&mut *conn).await.ok();
                    Err(e)
                }
            },
            Err(e) => {
                sqlx::query("ROLLBACK").execute(&mut *conn).await.ok();
                Err(e)
            }
        }
    }
}

async fn apply_in_transaction(
    conn: &mut SqliteConnection,
    collection: &str,
    key: &str,
    field: &[String],
    apply: Apply<'_>,
) -> Result<(Value, Option<Record>), sqlx::Error> {
    let existing = sqlx::query_scalar::<_, String>(
        "SELECT value FROM nodes WHERE collection = ? AND key = ?",
    )
    .bind(collection)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    let created = existing.is_none();
    let mut document = match existing {
        Some(raw) => parse_value(&raw)?,
        None => Value::Null,
    };

    let applied = apply(read_field(&document, field));
    write_field(&mut document, field, applied.clone());

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"INSERT INTO nodes (collection, key, value, updated_at) VALUES (?, ?, ?, ?)
           ON CONFLICT(collection, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
    )
    .bind(collection)
    .bind(key)
    .bind(document.to_string())
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    let record = created.then(|| Record {
        key: key.to_string(),
        value: document,
    });
    Ok((applied, record))
}

fn parse_value(raw: &str) -> Result<Value, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5" | "6" | "517")),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

fn to_records(rows: Vec<(String, String)>) -> Result<Vec<Record>, StoreError> {
    rows.into_iter()
        .map(|(key, raw)| {
            parse_value(&raw)
                .map(|value| Record { key, value })
                .map_err(StoreError::from)
        })
        .collect()
}

#[async_trait]
impl RemoteMessageStore for SqliteStore {
    fn push_key(&self) -> String {
        self.ids.generate()
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let key = path.require_key()?;
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT value FROM nodes WHERE collection = ? AND key = ?",
        )
        .bind(path.collection_name())
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        match raw {
            Some(raw) => {
                let document = parse_value(&raw)?;
                Ok(read_field(&document, path.field_segments()).cloned())
            }
            None => Ok(None),
        }
    }

    async fn range_query(
        &self,
        path: &StorePath,
        query: RangeQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let collection = path.require_collection()?;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let order = match query.direction {
            Direction::First => "ASC",
            Direction::Last => "DESC",
        };

        let rows = if let Some(end_at) = &query.end_at {
            let sql = format!(
                "SELECT key, value FROM nodes WHERE collection = ? AND key <= ? ORDER BY key {} LIMIT ?",
                order
            );
            sqlx::query_as::<_, (String, String)>(&sql)
                .bind(collection)
                .bind(end_at)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
        } else {
            let sql = format!(
                "SELECT key, value FROM nodes WHERE collection = ? ORDER BY key {} LIMIT ?",
                order
            );
            sqlx::query_as::<_, (String, String)>(&sql)
                .bind(collection)
                .bind(limit)
                .fetch_all(&self.db)
                .await?
        };

        let mut records = to_records(rows)?;
        if query.direction == Direction::Last {
            records.reverse(); // ascending key order
        }
        Ok(records)
    }

    async fn subscribe_child_added(
        &self,
        path: &StorePath,
        start_after: Option<String>,
    ) -> Result<ChildAdded, StoreError> {
        let collection = path.require_collection()?;
        let (id, rx) = self.hub.register(collection).await;

        let rows = if let Some(start_after) = &start_after {
            sqlx::query_as::<_, (String, String)>(
                "SELECT key, value FROM nodes WHERE collection = ? AND key > ? ORDER BY key ASC",
            )
            .bind(collection)
            .bind(start_after)
            .fetch_all(&self.db)
            .await
        } else {
            sqlx::query_as::<_, (String, String)>(
                "SELECT key, value FROM nodes WHERE collection = ? ORDER BY key ASC",
            )
            .bind(collection)
            .fetch_all(&self.db)
            .await
        };

        let backlog = match rows {
            Ok(rows) => to_records(rows),
            Err(e) => Err(e.into()),
        };
        match backlog {
            Ok(backlog) => Ok(ChildAdded::new(id, backlog, rx, Arc::downgrade(&self.hub))),
            Err(e) => {
                self.hub.unsubscribe(id).await;
                Err(e)
            }
        }
    }

    async fn transact(
        &self,
        path: &StorePath,
        apply: &ApplyFn,
    ) -> Result<Value, StoreError> {
        self.read_modify_write(path, apply).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let replace = move |_: Option<&Value>| value.clone();
        self.read_modify_write(path, &replace).await?;
        Ok(())
    }

    async fn update(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let merge = move |current: Option<&Value>| merge_fields(current, &fields);
        self.read_modify_write(path, &merge).await?;
        Ok(())
    }
}
