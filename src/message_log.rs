// Append-only message log
// Ids are assigned locally and only ever grow.

use log::debug;

use crate::error::{Result, SyncError};
use crate::models::Message;

#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    current_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::with_base(0)
    }

    /// Start numbering after `base`; the first appended message gets `base + 1`.
    pub fn with_base(base: u64) -> Self {
        MessageLog {
            messages: Vec::new(),
            current_id: base,
        }
    }

    /// Rebuild a log from existing records.
    ///
    /// Records are put back into id order. Ids must be unique and must not
    /// exceed `current_id`.
    pub(crate) fn from_parts(mut messages: Vec<Message>, current_id: u64) -> Result<Self> {
        messages.sort_by_key(|m| m.id);
        if let Some(pair) = messages.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(SyncError::InvalidSnapshot(format!("duplicate message id {}", pair[0].id)));
        }
        if let Some(last) = messages.last() {
            if last.id > current_id {
                return Err(SyncError::InvalidSnapshot(format!(
                    "message id {} is above the id counter {}",
                    last.id, current_id
                )));
            }
        }
        Ok(MessageLog { messages, current_id })
    }

    /// Store a new message and return its id.
    pub fn append(
        &mut self,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
        timestamp: f64,
    ) -> Result<u64> {
        let id = self
            .current_id
            .checked_add(1)
            .ok_or(SyncError::MessageIdExhausted { last: self.current_id })?;
        self.current_id = id;

        debug!("Appending message {} from {} to {}", id, sender_id, recipient_id);
        self.messages.push(Message {
            id,
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            content: content.to_string(),
            timestamp,
        });
        Ok(id)
    }

    /// Every message with `party_id` on either side, oldest first.
    ///
    /// Ties on timestamp fall back to id order. Recomputed on each call.
    pub fn conversation_with(&self, party_id: &str) -> Vec<&Message> {
        let mut chat: Vec<&Message> = self.messages.iter().filter(|m| m.involves(party_id)).collect();
        chat.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        chat
    }

    pub fn get(&self, id: u64) -> Option<&Message> {
        // Ids are strictly increasing in storage order
        self.messages
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|i| &self.messages[i])
    }

    /// The most recently assigned id, or the base if nothing was appended.
    pub fn last_id(&self) -> u64 {
        self.current_id
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}
