use thiserror::Error;

/// Errors surfaced by the synchronization engine.
///
/// Codec operations and directory lookups never fail; only id
/// exhaustion, malformed host input and invalid snapshots land here.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Message id space exhausted after id {last}")]
    MessageIdExhausted { last: u64 },

    #[error("Invalid {field} in visibility notice: {value:?}")]
    InvalidVisibilityNotice { field: &'static str, value: String },

    #[error("Message {message_id} is not in the conversation with {user_id}")]
    UnknownMessage { user_id: String, message_id: u64 },

    #[error("No conversation is open")]
    NoOpenConversation,

    #[error("Cannot open a conversation with {0}")]
    ConversationUnavailable(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
