use std::env;
use std::time::Duration;

use parley_shared::constants::{CHANNEL_LIST_LIMIT, MESSAGE_PAGE_SIZE, REACTION_APPLY_DELAY_MS};

/// Pages smaller than this never move the cursor past the boundary record.
pub const MIN_PAGE_SIZE: usize = 2;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_path: String,
    pub page_size: usize,
    pub reaction_apply_delay: Duration,
    pub channel_list_limit: usize,
    pub transaction_max_retries: u32,
    pub viewer_id: Option<String>,
    pub channel_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "./parley.db".into(),
            page_size: MESSAGE_PAGE_SIZE,
            reaction_apply_delay: Duration::from_millis(REACTION_APPLY_DELAY_MS),
            channel_list_limit: CHANNEL_LIST_LIMIT,
            transaction_max_retries: 25,
            viewer_id: None,
            channel_id: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            page_size: env::var("PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.page_size)
                .max(MIN_PAGE_SIZE),
            reaction_apply_delay: env::var("REACTION_APPLY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.reaction_apply_delay),
            channel_list_limit: env::var("CHANNEL_LIST_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.channel_list_limit),
            transaction_max_retries: env::var("TRANSACTION_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.transaction_max_retries),
            viewer_id: env::var("VIEWER_ID").ok().filter(|v| !v.is_empty()),
            channel_id: env::var("CHANNEL_ID").ok().filter(|v| !v.is_empty()),
        }
    }
}
