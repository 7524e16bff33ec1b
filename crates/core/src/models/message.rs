use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{from_epoch_seconds, to_epoch_seconds, User};
use crate::error::DecodeError;
use crate::store::Record;

pub type MessageId = String;

pub const REACTIONS_FIELD: &str = "reactions";
pub const USER_REACTIONS_FIELD: &str = "userReactions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminEvent {
    ChannelCreation,
    MemberAdded,
    MemberLeft,
    ChannelNameChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Photo,
    Video,
    Audio,
    Admin(AdminEvent),
}

impl MessageKind {
    /// Value of the `type` field.
    pub fn wire_name(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Photo => "photo",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::Admin(AdminEvent::ChannelCreation) => "channelCreation",
            MessageKind::Admin(AdminEvent::MemberAdded) => "memberAdded",
            MessageKind::Admin(AdminEvent::MemberLeft) => "memberLeft",
            MessageKind::Admin(AdminEvent::ChannelNameChanged) => "channelNameChanged",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        let kind = match name {
            "text" => MessageKind::Text,
            "photo" => MessageKind::Photo,
            "video" => MessageKind::Video,
            "audio" => MessageKind::Audio,
            "channelCreation" => MessageKind::Admin(AdminEvent::ChannelCreation),
            "memberAdded" => MessageKind::Admin(AdminEvent::MemberAdded),
            "memberLeft" => MessageKind::Admin(AdminEvent::MemberLeft),
            "channelNameChanged" => MessageKind::Admin(AdminEvent::ChannelNameChanged),
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, MessageKind::Admin(_))
    }

    pub fn is_media(&self) -> bool {
        matches!(self, MessageKind::Photo | MessageKind::Video | MessageKind::Audio)
    }
}

/// Media references carried by photo, video and audio messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaBody {
    pub thumbnail_url: Option<String>,
    pub thumbnail_width: Option<f64>,
    pub thumbnail_height: Option<f64>,
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub audio_duration: Option<f64>,
}

impl MediaBody {
    pub fn photo(thumbnail_url: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            thumbnail_url: Some(thumbnail_url.into()),
            thumbnail_width: Some(width),
            thumbnail_height: Some(height),
            ..Self::default()
        }
    }

    pub fn video(
        thumbnail_url: impl Into<String>,
        video_url: impl Into<String>,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            thumbnail_url: Some(thumbnail_url.into()),
            thumbnail_width: Some(width),
            thumbnail_height: Some(height),
            video_url: Some(video_url.into()),
            ..Self::default()
        }
    }

    pub fn audio(audio_url: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            audio_url: Some(audio_url.into()),
            audio_duration: Some(duration_secs),
            ..Self::default()
        }
    }

    /// The first reference `kind` needs but this body lacks.
    pub fn missing_for(&self, kind: MessageKind) -> Option<&'static str> {
        match kind {
            MessageKind::Photo if self.thumbnail_url.is_none() => Some("thumbnailUrls"),
            MessageKind::Video if self.video_url.is_none() => Some("videoURL"),
            MessageKind::Video if self.thumbnail_url.is_none() => Some("thumbnailUrls"),
            MessageKind::Audio if self.audio_url.is_none() => Some("audioURL"),
            MessageKind::Audio if self.audio_duration.is_none() => Some("audioDuration"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender_id: String,
    /// Resolved from the conversation's member list, if known.
    pub sender: Option<User>,
    pub kind: MessageKind,
    pub text: String,
    pub media: MediaBody,
    pub timestamp: DateTime<Utc>,
    pub reaction_counts: HashMap<String, u64>,
    pub user_reactions: HashMap<String, String>,
}

impl ChatMessage {
    pub fn has_reactions(&self) -> bool {
        !self.reaction_counts.is_empty()
    }

    pub fn is_sent_by(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }
}

/// Wire shape of a message record. Every field is optional here; required
/// fields are checked in [`decode_message`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "timeStamp", default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<f64>,
    #[serde(rename = "ownerUid", default, skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "thumbnailUrls", default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "thumbnailWidth", default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_width: Option<f64>,
    #[serde(rename = "thumbnailHeight", default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_height: Option<f64>,
    #[serde(rename = "videoURL", default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(rename = "audioURL", default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(rename = "audioDuration", default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub reactions: HashMap<String, u64>,
    #[serde(rename = "userReactions", default, skip_serializing_if = "HashMap::is_empty")]
    pub user_reactions: HashMap<String, String>,
}

/// A message about to be written. The store assigns nothing; the id comes
/// from [`crate::store::RemoteMessageStore::push_key`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub kind: MessageKind,
    pub text: String,
    pub media: MediaBody,
    pub timestamp: DateTime<Utc>,
}

impl OutgoingMessage {
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: MessageKind::Text,
            text: text.into(),
            media: MediaBody::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn media(
        sender_id: impl Into<String>,
        kind: MessageKind,
        caption: impl Into<String>,
        media: MediaBody,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind,
            text: caption.into(),
            media,
            timestamp: Utc::now(),
        }
    }

    pub fn admin(sender_id: impl Into<String>, event: AdminEvent) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: MessageKind::Admin(event),
            text: String::new(),
            media: MediaBody::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn to_record(&self) -> Value {
        let record = MessageRecord {
            kind: Some(self.kind.wire_name().to_string()),
            time_stamp: Some(to_epoch_seconds(self.timestamp)),
            owner_uid: Some(self.sender_id.clone()),
            text: (!self.kind.is_admin()).then(|| self.text.clone()),
            thumbnail_url: self.media.thumbnail_url.clone(),
            thumbnail_width: self.media.thumbnail_width,
            thumbnail_height: self.media.thumbnail_height,
            video_url: self.media.video_url.clone(),
            audio_url: self.media.audio_url.clone(),
            audio_duration: self.media.audio_duration,
            reactions: HashMap::new(),
            user_reactions: HashMap::new(),
        };
        serde_json::to_value(record).unwrap_or(Value::Null)
    }
}

/// Validate a raw record against the message schema.
pub fn decode_message(record: &Record) -> Result<ChatMessage, DecodeError> {
    let key = &record.key;
    if !record.value.is_object() {
        return Err(DecodeError::NotAnObject { key: key.clone() });
    }

    let raw: MessageRecord =
        serde_json::from_value(record.value.clone()).map_err(|e| DecodeError::Schema {
            key: key.clone(),
            reason: e.to_string(),
        })?;

    let kind_name = raw.kind.ok_or_else(|| DecodeError::MissingField {
        key: key.clone(),
        field: "type",
    })?;
    let kind = MessageKind::from_wire(&kind_name).ok_or_else(|| DecodeError::UnknownKind {
        key: key.clone(),
        kind: kind_name.clone(),
    })?;

    let seconds = raw.time_stamp.ok_or_else(|| DecodeError::MissingField {
        key: key.clone(),
        field: "timeStamp",
    })?;
    let timestamp = from_epoch_seconds(seconds).ok_or_else(|| DecodeError::InvalidField {
        key: key.clone(),
        field: "timeStamp",
    })?;

    let sender_id = raw
        .owner_uid
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| DecodeError::MissingField {
            key: key.clone(),
            field: "ownerUid",
        })?;

    let media = MediaBody {
        thumbnail_url: raw.thumbnail_url,
        thumbnail_width: raw.thumbnail_width,
        thumbnail_height: raw.thumbnail_height,
        video_url: raw.video_url,
        audio_url: raw.audio_url,
        audio_duration: raw.audio_duration,
    };
    if let Some(field) = media.missing_for(kind) {
        return Err(DecodeError::MissingField {
            key: key.clone(),
            field,
        });
    }

    Ok(ChatMessage {
        id: key.clone(),
        sender_id,
        sender: None,
        kind,
        text: raw.text.unwrap_or_default(),
        media,
        timestamp,
        reaction_counts: raw.reactions,
        user_reactions: raw.user_reactions,
    })
}
