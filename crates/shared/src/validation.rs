use crate::constants::*;

pub fn validate_message_text(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("Message text is required".into());
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

/// Media messages may carry an empty caption.
pub fn validate_caption(text: &str) -> Result<(), String> {
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Caption must be at most {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_channel_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Channel name is required".into());
    }
    if trimmed.chars().count() > MAX_CHANNEL_NAME_LENGTH {
        return Err(format!(
            "Channel name must be at most {} characters",
            MAX_CHANNEL_NAME_LENGTH
        ));
    }
    Ok(())
}

pub fn validate_group_members(member_count: usize) -> Result<(), String> {
    // creator plus at least two others, otherwise it is a direct chat
    if member_count < 3 {
        return Err("A group needs at least two other members".into());
    }
    if member_count > MAX_GROUP_MEMBERS {
        return Err(format!(
            "A group can have at most {} members",
            MAX_GROUP_MEMBERS
        ));
    }
    Ok(())
}

pub fn validate_reaction_emoji(emoji: &str) -> Result<(), String> {
    if !REACTION_EMOJIS.contains(&emoji) {
        return Err(format!("Unsupported reaction: {}", emoji));
    }
    Ok(())
}

/// Store keys become path segments, so they must not contain separators.
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("Key is required".into());
    }
    if key.contains('/') {
        return Err(format!("Key must not contain '/': {}", key));
    }
    Ok(())
}
