use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{from_epoch_seconds, to_epoch_seconds, MessageKind, User};
use crate::error::DecodeError;
use crate::store::Record;

pub type ChannelId = String;

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: Option<String>,
    pub member_ids: Vec<String>,
    /// Profiles resolved so far; may lag behind `member_ids`.
    pub members: Vec<User>,
    pub admin_ids: Vec<String>,
    pub created_by: String,
    pub creation_date: DateTime<Utc>,
    pub last_message: String,
    pub last_message_timestamp: DateTime<Utc>,
    pub last_message_kind: MessageKind,
    pub unread_count: u64,
}

impl Channel {
    pub fn is_group(&self) -> bool {
        self.member_ids.len() > 2
    }

    pub fn all_members_fetched(&self) -> bool {
        self.member_ids
            .iter()
            .all(|uid| self.members.iter().any(|member| &member.uid == uid))
    }

    pub fn missing_member_ids(&self) -> Vec<String> {
        self.member_ids
            .iter()
            .filter(|uid| !self.members.iter().any(|member| &member.uid == *uid))
            .cloned()
            .collect()
    }

    pub fn member(&self, uid: &str) -> Option<&User> {
        self.members.iter().find(|member| member.uid == uid)
    }

    pub fn members_excluding(&self, uid: &str) -> Vec<&User> {
        self.members.iter().filter(|member| member.uid != uid).collect()
    }

    /// Line shown under the conversation title in a conversation list.
    pub fn preview_text(&self) -> String {
        match self.last_message_kind {
            MessageKind::Admin(_) => "Chat created start conversation".into(),
            MessageKind::Text => self.last_message.clone(),
            MessageKind::Photo => "Photo Message".into(),
            MessageKind::Video => "Video Message".into(),
            MessageKind::Audio => "Voice Message".into(),
        }
    }

    /// Display title as seen by `viewer_id`: the explicit name, the partner's
    /// name for a direct chat, or a summary of member names for a group.
    pub fn title(&self, viewer_id: &str) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        let others: Vec<&str> = self
            .members_excluding(viewer_id)
            .into_iter()
            .map(|member| member.username.as_str())
            .collect();

        if !self.is_group() {
            return others.first().map(|n| n.to_string()).unwrap_or_else(|| "Unknown".into());
        }

        let other_count = self.member_ids.len().saturating_sub(1);
        match other_count {
            2 => others.join(" and "),
            n if n > 2 => format!(
                "{}, and {} others",
                others.iter().take(2).copied().collect::<Vec<_>>().join(", "),
                n - 2
            ),
            _ => "Unknown".into(),
        }
    }

    pub fn to_record(&self) -> Value {
        let record = ChannelRecord {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            last_message: Some(self.last_message.clone()),
            creation_date: Some(to_epoch_seconds(self.creation_date)),
            last_message_time_stamp: Some(to_epoch_seconds(self.last_message_timestamp)),
            members_count: Some(self.member_ids.len() as u64),
            admin_uids: self.admin_ids.clone(),
            members_uids: self.member_ids.clone(),
            created_by: Some(self.created_by.clone()),
            last_message_type: Some(self.last_message_kind.wire_name().to_string()),
        };
        serde_json::to_value(record).unwrap_or(Value::Null)
    }
}

/// Denormalized summary fields rewritten by every send.
pub fn last_message_fields(
    text: &str,
    kind: MessageKind,
    timestamp: DateTime<Utc>,
) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("lastMessage".into(), Value::from(text));
    fields.insert("lastMessageTimeStamp".into(), Value::from(to_epoch_seconds(timestamp)));
    fields.insert("lastMessageType".into(), Value::from(kind.wire_name()));
    fields
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time_stamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members_count: Option<u64>,
    #[serde(default)]
    pub admin_uids: Vec<String>,
    #[serde(default)]
    pub members_uids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_type: Option<String>,
}

pub fn decode_channel(record: &Record) -> Result<Channel, DecodeError> {
    let key = &record.key;
    if !record.value.is_object() {
        return Err(DecodeError::NotAnObject { key: key.clone() });
    }

    let raw: ChannelRecord =
        serde_json::from_value(record.value.clone()).map_err(|e| DecodeError::Schema {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    if raw.members_uids.is_empty() {
        return Err(DecodeError::MissingField {
            key: key.clone(),
            field: "membersUids",
        });
    }
    if let Some(count) = raw.members_count {
        if count != raw.members_uids.len() as u64 {
            return Err(DecodeError::InvalidField {
                key: key.clone(),
                field: "membersCount",
            });
        }
    }

    let created_by = raw.created_by.ok_or_else(|| DecodeError::MissingField {
        key: key.clone(),
        field: "createdBy",
    })?;
    let creation_date = raw
        .creation_date
        .and_then(from_epoch_seconds)
        .ok_or_else(|| DecodeError::InvalidField {
            key: key.clone(),
            field: "creationDate",
        })?;
    let last_message_timestamp = match raw.last_message_time_stamp {
        Some(seconds) => from_epoch_seconds(seconds).ok_or_else(|| DecodeError::InvalidField {
            key: key.clone(),
            field: "lastMessageTimeStamp",
        })?,
        None => creation_date,
    };
    let last_message_kind = match raw.last_message_type.as_deref() {
        Some(name) => MessageKind::from_wire(name).ok_or_else(|| DecodeError::UnknownKind {
            key: key.clone(),
            kind: name.to_string(),
        })?,
        None => MessageKind::Text,
    };

    Ok(Channel {
        id: key.clone(),
        name: raw.name.filter(|name| !name.trim().is_empty()),
        member_ids: raw.members_uids,
        members: Vec::new(),
        admin_ids: raw.admin_uids,
        created_by,
        creation_date,
        last_message: raw.last_message.unwrap_or_default(),
        last_message_timestamp,
        last_message_kind,
        unread_count: 0,
    })
}
