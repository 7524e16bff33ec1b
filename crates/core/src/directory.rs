//! User profiles and conversation records.

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use parley_shared::validation::{validate_channel_name, validate_group_members};

use crate::error::{ChatError, Result};
use crate::models::{
    decode_channel, decode_user, AdminEvent, Channel, MessageKind, OutgoingMessage, User,
};
use crate::store::{RangeQuery, Record, RemoteMessageStore, StorePath};
use crate::unread::UnreadCounterService;

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn RemoteMessageStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn RemoteMessageStore>) -> Self {
        Self { store }
    }

    pub async fn put_user(&self, user: &User) -> Result<()> {
        let value = serde_json::to_value(user).map_err(|e| ChatError::Validation(e.to_string()))?;
        self.store.set(&StorePath::user(&user.uid), value).await?;
        Ok(())
    }

    pub async fn get_user(&self, uid: &str) -> Result<Option<User>> {
        let Some(value) = self.store.get(&StorePath::user(uid)).await? else {
            return Ok(None);
        };
        let user = decode_user(&Record {
            key: uid.to_string(),
            value,
        })?;
        Ok(Some(user))
    }

    /// Resolve profiles in the order given. Unknown or malformed users are
    /// left out.
    pub async fn get_users(&self, uids: &[String]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.get_user(uid).await {
                Ok(Some(user)) => users.push(user),
                Ok(None) => tracing::warn!("User {} not found", uid),
                Err(ChatError::MalformedRecord(e)) => tracing::warn!("Skipping user: {}", e),
                Err(e) => return Err(e),
            }
        }
        Ok(users)
    }
}

#[derive(Clone)]
pub struct ChannelDirectory {
    store: Arc<dyn RemoteMessageStore>,
    users: UserDirectory,
    unread: UnreadCounterService,
    list_limit: usize,
}

impl ChannelDirectory {
    pub fn new(store: Arc<dyn RemoteMessageStore>, list_limit: usize) -> Self {
        Self {
            users: UserDirectory::new(store.clone()),
            unread: UnreadCounterService::new(store.clone()),
            store,
            list_limit,
        }
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub async fn create_group_channel(
        &self,
        creator_id: &str,
        name: Option<&str>,
        member_ids: &[String],
    ) -> Result<Channel> {
        if let Some(name) = name {
            validate_channel_name(name).map_err(ChatError::Validation)?;
        }

        let members = collect_members(creator_id, member_ids);
        validate_group_members(members.len()).map_err(ChatError::Validation)?;

        self.create_channel(creator_id, name.map(|n| n.trim().to_string()), members)
            .await
    }

    /// Return the existing direct chat between the two users, creating it on
    /// first use.
    pub async fn create_direct_channel(&self, creator_id: &str, partner_id: &str) -> Result<Channel> {
        if creator_id == partner_id {
            return Err(ChatError::Validation(
                "Cannot start a direct chat with yourself".into(),
            ));
        }

        if let Some(entry) = self
            .store
            .get(&StorePath::direct_channel(creator_id, partner_id))
            .await?
        {
            if let Some(channel_id) = entry.as_object().and_then(|m| m.keys().next()) {
                if let Some(channel) = self.get_channel(channel_id).await? {
                    return Ok(channel);
                }
                tracing::warn!("Direct chat index points at missing channel {}", channel_id);
            }
        }

        let members = collect_members(creator_id, &[partner_id.to_string()]);
        let channel = self.create_channel(creator_id, None, members).await?;

        let mut index = Map::new();
        index.insert(channel.id.clone(), Value::Bool(true));
        let index_entry = Value::Object(index);
        self.store
            .set(&StorePath::direct_channel(creator_id, partner_id), index_entry.clone())
            .await?;
        self.store
            .set(&StorePath::direct_channel(partner_id, creator_id), index_entry)
            .await?;

        Ok(channel)
    }

    async fn create_channel(
        &self,
        creator_id: &str,
        name: Option<String>,
        member_ids: Vec<String>,
    ) -> Result<Channel> {
        let now = Utc::now();
        let mut channel = Channel {
            id: self.store.push_key(),
            name,
            member_ids,
            members: Vec::new(),
            admin_ids: vec![creator_id.to_string()],
            created_by: creator_id.to_string(),
            creation_date: now,
            last_message: String::new(),
            last_message_timestamp: now,
            last_message_kind: MessageKind::Admin(AdminEvent::ChannelCreation),
            unread_count: 0,
        };

        self.store
            .set(&StorePath::channel(&channel.id), channel.to_record())
            .await?;

        let mut created = OutgoingMessage::admin(creator_id, AdminEvent::ChannelCreation);
        created.timestamp = now;
        let message_id = self.store.push_key();
        self.store
            .set(&StorePath::message(&channel.id, &message_id), created.to_record())
            .await?;

        for uid in &channel.member_ids {
            self.store
                .set(&StorePath::unread_counter(uid, &channel.id), Value::from(0u64))
                .await?;
        }

        channel.members = self.users.get_users(&channel.member_ids).await?;
        tracing::info!(
            "Created channel {} with {} members",
            channel.id,
            channel.member_ids.len()
        );
        Ok(channel)
    }

    /// Load a channel with its member profiles resolved.
    pub async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let Some(value) = self.store.get(&StorePath::channel(channel_id)).await? else {
            return Ok(None);
        };
        let mut channel = decode_channel(&Record {
            key: channel_id.to_string(),
            value,
        })?;
        channel.members = self.users.get_users(&channel.member_ids).await?;
        Ok(Some(channel))
    }

    /// The user's conversations with their unread counts, most recently
    /// active first.
    pub async fn list_user_channels(&self, user_id: &str) -> Result<Vec<Channel>> {
        let entries = self
            .store
            .range_query(
                &StorePath::user_channels(user_id),
                RangeQuery::first(self.list_limit),
            )
            .await?;

        let mut channels = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.get_channel(&entry.key).await {
                Ok(Some(mut channel)) => {
                    channel.unread_count = entry.value.as_u64().unwrap_or(0);
                    channels.push(channel);
                }
                Ok(None) => tracing::warn!("Channel {} listed for {} not found", entry.key, user_id),
                Err(ChatError::MalformedRecord(e)) => tracing::warn!("Skipping channel: {}", e),
                Err(e) => return Err(e),
            }
        }

        channels.sort_by(|a, b| b.last_message_timestamp.cmp(&a.last_message_timestamp));
        Ok(channels)
    }

    pub async fn unread_count(&self, channel_id: &str, user_id: &str) -> Result<u64> {
        Ok(self.unread.unread_count(channel_id, user_id).await?)
    }
}

/// Creator first, then the other members in the given order, without repeats.
fn collect_members(creator_id: &str, member_ids: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    std::iter::once(creator_id.to_string())
        .chain(member_ids.iter().cloned())
        .filter(|uid| seen.insert(uid.clone()))
        .collect()
}
