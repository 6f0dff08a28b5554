use serde::{Deserialize, Serialize};

/// Where a contact is in the identity lookup handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Bootstrapping, // Identity exchange in progress, no user_id yet
    Incoming,      // Remote party wants to chat, not yet accepted
    Ready,         // Resolved and usable for messaging
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_id: Option<String>,
    pub lookup_status: LookupStatus,
    pub last_message_id: Option<u64>,
    pub last_message_timestamp: Option<f64>,
}

impl Contact {
    /// A resolved contact with no read pointer yet.
    pub fn resolved(user_id: &str, status: LookupStatus) -> Self {
        Contact {
            user_id: Some(user_id.to_string()),
            bootstrap_id: None,
            lookup_status: status,
            last_message_id: None,
            last_message_timestamp: None,
        }
    }

    /// A contact still waiting on its identity exchange.
    pub fn bootstrapping(bootstrap_id: &str) -> Self {
        Contact {
            user_id: None,
            bootstrap_id: Some(bootstrap_id.to_string()),
            lookup_status: LookupStatus::Bootstrapping,
            last_message_id: None,
            last_message_timestamp: None,
        }
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    /// Check the state/identity invariants for this record.
    pub fn check(&self) -> Result<(), String> {
        match self.lookup_status {
            LookupStatus::Bootstrapping => {
                if self.user_id.is_some() {
                    return Err("bootstrapping contact has a user_id".to_string());
                }
                if self.bootstrap_id.is_none() {
                    return Err("bootstrapping contact has no bootstrap_id".to_string());
                }
            }
            LookupStatus::Incoming | LookupStatus::Ready => {
                if self.user_id.is_none() {
                    return Err(format!("{:?} contact has no user_id", self.lookup_status));
                }
                if self.bootstrap_id.is_some() {
                    return Err(format!("{:?} contact still has a bootstrap_id", self.lookup_status));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub timestamp: f64, // Seconds since epoch, may be fractional
}

impl Message {
    pub fn involves(&self, party_id: &str) -> bool {
        self.sender_id == party_id || self.recipient_id == party_id
    }
}

/// A locally sent message the host still has to hand to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub id: u64,
    pub recipient_id: String,
    pub content: String,
    pub timestamp: f64,
}

/// A contact as the presentation layer lists it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactSummary {
    pub contact: Contact,
    pub unread: usize,
}
