pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod live;
pub mod merger;
pub mod models;
pub mod pager;
pub mod reactions;
pub mod session;
pub mod store;
pub mod unread;

pub use config::Config;
pub use error::{ChatError, DecodeError, StoreError};
pub use session::{ChatRoomSession, SessionHandle, SessionState};
pub use store::{RemoteMessageStore, StorePath};
