pub const APP_NAME: &str = "Parley";

// Limits
pub const MAX_MESSAGE_LENGTH: usize = 4000;
pub const MAX_CHANNEL_NAME_LENGTH: usize = 100;
pub const MAX_GROUP_MEMBERS: usize = 12;

pub const MESSAGE_PAGE_SIZE: usize = 15;
pub const CHANNEL_LIST_LIMIT: usize = 10;

// Delay before a confirmed reaction is folded into the local message
pub const REACTION_APPLY_DELAY_MS: u64 = 200;

// Store layout
pub const USERS_ROOT: &str = "users";
pub const CHANNELS_ROOT: &str = "channels";
pub const CHANNEL_MESSAGES_ROOT: &str = "channel-messages";
pub const USER_CHANNELS_ROOT: &str = "user-channels";
pub const USER_DIRECT_CHANNELS_ROOT: &str = "user-direct-channels";

// Reaction palette, in display order
pub const REACTION_EMOJIS: [&str; 6] = ["👍", "❤️", "😂", "😱", "😢", "🙏"];
