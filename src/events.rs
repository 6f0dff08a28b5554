use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::models::{LookupStatus, OutgoingMessage};

/// Everything the host can tell the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum HostEvent {
    Started { psn_slug: String, clients: Vec<String> },
    MessageReceived { psn_slug: String, msg_text: String, unix_time_us: f64 },
    PlainMessageReceived { sender_id: String, content: String, timestamp: f64 },
    SendRequested { content: String, timestamp: Option<f64> },
    ChatOpened { user_id: String },
    ChatClosed,
    MessageVisible { user_id: String, message_id: String, timestamp: String },
    ContactAdded { user_id: String, lookup_status: LookupStatus },
    BootstrapStarted { bootstrap_id: String },
    BootstrapResolved { bootstrap_id: String, user_id: String },
    IncomingAccepted { user_id: String },
}

/// What the presentation layer should redraw or do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineUpdate {
    ContactsChanged,
    ConversationChanged { user_id: String },
    UnreadChanged { user_id: String, count: usize },
    Outgoing(OutgoingMessage),
    Rejected { reason: String },
}

/// A message element that scrolled into view, with its id and timestamp
/// already parsed to numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityNotice {
    pub message_id: u64,
    pub timestamp: f64,
}

impl VisibilityNotice {
    /// Parse the textual attributes a view element carries.
    ///
    /// Comparing ids as text would order "9" after "10", so both values are
    /// turned into numbers here or rejected.
    pub fn parse(message_id: &str, timestamp: &str) -> Result<Self> {
        let id = message_id.trim().parse::<u64>().map_err(|_| SyncError::InvalidVisibilityNotice {
            field: "message_id",
            value: message_id.to_string(),
        })?;
        let ts = timestamp
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| SyncError::InvalidVisibilityNotice {
                field: "timestamp",
                value: timestamp.to_string(),
            })?;
        Ok(VisibilityNotice {
            message_id: id,
            timestamp: ts,
        })
    }
}
