use thiserror::Error;

/// Failures reported by a [`crate::store::RemoteMessageStore`] adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network or backend failure. Never retried by the session pipeline.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The adapter ran out of retries while resolving a write conflict.
    #[error("Transaction conflict at {path} after {attempts} attempts")]
    Conflict { path: String, attempts: u32 },

    #[error("Invalid store path: {0}")]
    InvalidPath(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// A fetched record that does not match the message or channel schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Record {key} is not an object")]
    NotAnObject { key: String },

    #[error("Record {key} is missing field {field}")]
    MissingField { key: String, field: &'static str },

    #[error("Record {key} has an invalid {field}")]
    InvalidField { key: String, field: &'static str },

    #[error("Record {key} has unknown message type {kind:?}")]
    UnknownKind { key: String, kind: String },

    #[error("Record {key} does not match its schema: {reason}")]
    Schema { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] DecodeError),

    #[error("Duplicate merge violation: {0}")]
    DuplicateMergeViolation(String),

    #[error("Session is not live (state: {0})")]
    NotLive(String),

    #[error("Session disposed")]
    Disposed,

    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
