use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::store::Record;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

impl User {
    pub fn new(uid: impl Into<String>, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            username: username.into(),
            email: email.into(),
            bio: None,
            profile_image_url: None,
        }
    }
}

pub fn decode_user(record: &Record) -> Result<User, DecodeError> {
    if !record.value.is_object() {
        return Err(DecodeError::NotAnObject {
            key: record.key.clone(),
        });
    }
    let user: User =
        serde_json::from_value(record.value.clone()).map_err(|e| DecodeError::Schema {
            key: record.key.clone(),
            reason: e.to_string(),
        })?;
    if user.uid != record.key {
        return Err(DecodeError::InvalidField {
            key: record.key.clone(),
            field: "uid",
        });
    }
    Ok(user)
}
