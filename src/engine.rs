// Synchronization engine
// Owns the contact directory and message log, applies host events to them,
// and answers the read-tracking questions the presentation layer asks.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::codec;
use crate::config::EngineConfig;
use crate::directory::ContactDirectory;
use crate::error::{Result, SyncError};
use crate::events::{EngineUpdate, HostEvent, VisibilityNotice};
use crate::message_log::MessageLog;
use crate::models::{Contact, ContactSummary, LookupStatus, Message, OutgoingMessage};

/// Full engine state in the shape the host exchanges it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub my_id: String,
    pub current_message_id: u64,
    #[serde(default)]
    pub current_partner_id: Option<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Snapshot {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.write_to(File::create(path)?)?;
        debug!("Snapshot saved to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SyncEngine {
    local_id: String,
    directory: ContactDirectory,
    log: MessageLog,
    current_partner: Option<String>,
}

impl SyncEngine {
    pub fn new(local_id: &str) -> Self {
        Self::with_message_base(local_id, 0)
    }

    pub fn with_message_base(local_id: &str, base: u64) -> Self {
        SyncEngine {
            local_id: local_id.to_string(),
            directory: ContactDirectory::new(),
            log: MessageLog::with_base(base),
            current_partner: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_message_base(config.local_id.as_deref().unwrap_or(""), config.message_id_base)
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn directory(&self) -> &ContactDirectory {
        &self.directory
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn contact(&self, user_id: &str) -> Option<&Contact> {
        self.directory.lookup(user_id)
    }

    pub fn conversation_with(&self, party_id: &str) -> Vec<&Message> {
        self.log.conversation_with(party_id)
    }

    /// Adopt the local identity and the roster the native engine reports
    /// at start-up. The local slug itself is skipped.
    pub fn start<'a, I>(&mut self, local_slug: &str, client_slugs: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.local_id = codec::slug_to_display(local_slug);
        info!("Engine started as {}", self.local_id);

        let peers: Vec<String> = client_slugs
            .into_iter()
            .filter(|slug| *slug != local_slug)
            .map(codec::slug_to_display)
            .collect();
        let added = self.directory.populate_ready(peers.iter().map(String::as_str));
        info!("Loaded {} contacts from roster", added);
        added
    }

    /// Record a message delivered to us.
    ///
    /// Unknown senders get a ready contact. If the sender's conversation is
    /// open the message counts as read immediately.
    pub fn receive(&mut self, sender_id: &str, content: &str, timestamp: f64) -> Result<u64> {
        let id = self.log.append(sender_id, &self.local_id, content, timestamp)?;
        self.directory.upsert_incoming(sender_id);
        if self.current_partner.as_deref() == Some(sender_id) {
            self.directory.advance_read_pointer(sender_id, id, timestamp);
        }
        Ok(id)
    }

    /// Boundary form of `receive` for what the native engine hands over.
    pub fn receive_slug(&mut self, psn_slug: &str, content: &str, unix_time_us: f64) -> Result<u64> {
        let sender = codec::slug_to_display(psn_slug);
        self.receive(&sender, content, unix_time_us / 1_000_000.0)
    }

    /// Record a message we send to the open conversation.
    ///
    /// Empty content is ignored. Our own message moves the read pointer,
    /// since everything before it has been seen.
    pub fn send(&mut self, content: &str, timestamp: f64) -> Result<Option<OutgoingMessage>> {
        if content.is_empty() {
            return Ok(None);
        }
        let partner = self.current_partner.clone().ok_or(SyncError::NoOpenConversation)?;
        let id = self.log.append(&self.local_id, &partner, content, timestamp)?;
        self.directory.advance_read_pointer(&partner, id, timestamp);
        debug!("Queued message {} for {}", id, partner);
        Ok(Some(OutgoingMessage {
            id,
            recipient_id: partner,
            content: content.to_string(),
            timestamp,
        }))
    }

    /// Open the conversation with a ready contact.
    pub fn open_conversation(&mut self, user_id: &str) -> bool {
        match self.directory.lookup(user_id) {
            Some(contact) if contact.lookup_status == LookupStatus::Ready => {
                self.current_partner = Some(user_id.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn close_conversation(&mut self) {
        self.current_partner = None;
    }

    pub fn open_partner(&self) -> Option<&str> {
        self.current_partner.as_deref()
    }

    /// How many messages in the conversation come after the read pointer,
    /// counting in id order.
    ///
    /// A pointer that names a message not in the conversation counts
    /// everything as unread.
    pub fn unread_count(&self, party_id: &str) -> usize {
        let mut chat = self.log.conversation_with(party_id);
        chat.sort_by_key(|m| m.id);

        let pointer = self.read_pointer(party_id);
        let position = pointer.and_then(|id| chat.iter().position(|m| m.id == id));
        if let (Some(id), None) = (pointer, position) {
            warn!("Read pointer {} for {} not found in conversation, counting all as unread", id, party_id);
        }

        match position {
            Some(k) => chat.len() - k - 1,
            None => chat.len(),
        }
    }

    /// A message came into view. Safe to call repeatedly and in any order.
    pub fn on_message_visible(&mut self, party_id: &str, message_id: u64, timestamp: f64) -> bool {
        self.directory.advance_read_pointer(party_id, message_id, timestamp)
    }

    pub fn on_visibility_notice(&mut self, party_id: &str, notice: VisibilityNotice) -> bool {
        self.on_message_visible(party_id, notice.message_id, notice.timestamp)
    }

    /// The first message, in display order, that is newer than the read
    /// pointer. This is where a "new messages" divider goes.
    pub fn first_unread(&self, party_id: &str) -> Option<u64> {
        let pointer = self.read_pointer(party_id);
        self.log
            .conversation_with(party_id)
            .into_iter()
            .find(|m| pointer.map_or(true, |p| m.id > p))
            .map(|m| m.id)
    }

    /// Ids of messages the host should watch for visibility.
    pub fn pending_visibility(&self, party_id: &str) -> Vec<u64> {
        let pointer = self.read_pointer(party_id);
        self.log
            .conversation_with(party_id)
            .into_iter()
            .filter(|m| pointer.map_or(true, |p| m.id > p))
            .map(|m| m.id)
            .collect()
    }

    /// Contacts in display order with their unread badges. Only ready
    /// contacts carry a count.
    pub fn contact_summaries(&self) -> Vec<ContactSummary> {
        self.directory
            .sorted_for_display()
            .into_iter()
            .map(|contact| {
                let unread = match (&contact.user_id, contact.lookup_status) {
                    (Some(uid), LookupStatus::Ready) => self.unread_count(uid),
                    _ => 0,
                };
                ContactSummary {
                    contact: contact.clone(),
                    unread,
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            my_id: self.local_id.clone(),
            current_message_id: self.log.last_id(),
            current_partner_id: self.current_partner.clone(),
            contacts: self.directory.iter().cloned().collect(),
            messages: self.log.iter().cloned().collect(),
        }
    }

    /// Rebuild an engine from a snapshot, rejecting any that break the
    /// directory or log invariants.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let directory = ContactDirectory::from_contacts(snapshot.contacts)?;
        let log = MessageLog::from_parts(snapshot.messages, snapshot.current_message_id)?;
        if let Some(partner) = snapshot.current_partner_id.as_deref() {
            match directory.lookup(partner) {
                Some(contact) if contact.lookup_status == LookupStatus::Ready => {}
                Some(contact) => {
                    return Err(SyncError::InvalidSnapshot(format!(
                        "open partner {} is {:?}, not ready",
                        partner, contact.lookup_status
                    )));
                }
                None => {
                    return Err(SyncError::InvalidSnapshot(format!("open partner {} is not a contact", partner)));
                }
            }
        }
        Ok(SyncEngine {
            local_id: snapshot.my_id,
            directory,
            log,
            current_partner: snapshot.current_partner_id,
        })
    }

    /// Apply one host event and report what changed.
    pub fn apply(&mut self, event: HostEvent) -> Vec<EngineUpdate> {
        match self.try_apply(event) {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Rejected host event: {}", e);
                vec![EngineUpdate::Rejected { reason: e.to_string() }]
            }
        }
    }

    fn try_apply(&mut self, event: HostEvent) -> Result<Vec<EngineUpdate>> {
        let mut updates = Vec::new();
        match event {
            HostEvent::Started { psn_slug, clients } => {
                self.start(&psn_slug, clients.iter().map(String::as_str));
                updates.push(EngineUpdate::ContactsChanged);
            }

            HostEvent::MessageReceived { psn_slug, msg_text, unix_time_us } => {
                let id = self.receive_slug(&psn_slug, &msg_text, unix_time_us)?;
                self.push_received(&mut updates, id);
            }

            HostEvent::PlainMessageReceived { sender_id, content, timestamp } => {
                let id = self.receive(&sender_id, &content, timestamp)?;
                self.push_received(&mut updates, id);
            }

            HostEvent::SendRequested { content, timestamp } => {
                let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp() as f64);
                if let Some(outgoing) = self.send(&content, timestamp)? {
                    updates.push(EngineUpdate::ConversationChanged {
                        user_id: outgoing.recipient_id.clone(),
                    });
                    updates.push(EngineUpdate::ContactsChanged);
                    updates.push(EngineUpdate::Outgoing(outgoing));
                }
            }

            HostEvent::ChatOpened { user_id } => {
                if !self.open_conversation(&user_id) {
                    return Err(SyncError::ConversationUnavailable(user_id));
                }
                updates.push(EngineUpdate::ConversationChanged { user_id });
            }

            HostEvent::ChatClosed => {
                self.close_conversation();
                updates.push(EngineUpdate::ContactsChanged);
            }

            HostEvent::MessageVisible { user_id, message_id, timestamp } => {
                let notice = VisibilityNotice::parse(&message_id, &timestamp)?;
                let notice = self.confirm_notice(&user_id, notice)?;
                if self.on_visibility_notice(&user_id, notice) {
                    let count = self.unread_count(&user_id);
                    updates.push(EngineUpdate::UnreadChanged { user_id, count });
                }
            }

            HostEvent::ContactAdded { user_id, lookup_status } => {
                if self.directory.add_contact(&user_id, lookup_status) {
                    updates.push(EngineUpdate::ContactsChanged);
                }
            }

            HostEvent::BootstrapStarted { bootstrap_id } => {
                if self.directory.begin_bootstrap(&bootstrap_id) {
                    updates.push(EngineUpdate::ContactsChanged);
                }
            }

            HostEvent::BootstrapResolved { bootstrap_id, user_id } => {
                if self.directory.resolve_bootstrap(&bootstrap_id, &user_id) {
                    updates.push(EngineUpdate::ContactsChanged);
                }
            }

            HostEvent::IncomingAccepted { user_id } => {
                if self.directory.accept_incoming(&user_id) {
                    updates.push(EngineUpdate::ContactsChanged);
                }
            }
        }
        Ok(updates)
    }

    /// Check a notice against the log. The id must belong to the party's
    /// conversation, and the stored timestamp wins over the view's copy.
    fn confirm_notice(&self, party_id: &str, notice: VisibilityNotice) -> Result<VisibilityNotice> {
        match self.log.get(notice.message_id) {
            Some(msg) if msg.involves(party_id) => Ok(VisibilityNotice {
                message_id: msg.id,
                timestamp: msg.timestamp,
            }),
            _ => Err(SyncError::UnknownMessage {
                user_id: party_id.to_string(),
                message_id: notice.message_id,
            }),
        }
    }

    fn read_pointer(&self, party_id: &str) -> Option<u64> {
        self.directory.lookup(party_id).and_then(|c| c.last_message_id)
    }

    fn push_received(&self, updates: &mut Vec<EngineUpdate>, id: u64) {
        let Some(sender) = self.log.get(id).map(|m| m.sender_id.clone()) else {
            return;
        };
        if self.current_partner.as_deref() == Some(sender.as_str()) {
            updates.push(EngineUpdate::ConversationChanged { user_id: sender.clone() });
        }
        let count = self.unread_count(&sender);
        updates.push(EngineUpdate::UnreadChanged { user_id: sender, count });
        updates.push(EngineUpdate::ContactsChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob_with_alice() -> SyncEngine {
        let mut engine = SyncEngine::with_message_base("Bob", 9);
        for (i, ts) in [100.0, 110.0, 120.0, 130.0].iter().enumerate() {
            engine.receive("Alice", &format!("msg {}", i), *ts).unwrap();
        }
        engine
    }

    #[test]
    fn test_receive_assigns_ids_and_auto_provisions() {
        let engine = bob_with_alice();
        let ids: Vec<u64> = engine.conversation_with("Alice").iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![10, 11, 12, 13]);
        assert_eq!(engine.directory().len(), 1);
        assert!(engine.conversation_with("Alice").iter().all(|m| m.recipient_id == "Bob"));
    }

    #[test]
    fn test_unread_count_follows_read_pointer() {
        let mut engine = bob_with_alice();
        assert_eq!(engine.unread_count("Alice"), 4);

        engine.on_message_visible("Alice", 11, 110.0);
        assert_eq!(engine.unread_count("Alice"), 2);

        engine.on_message_visible("Alice", 13, 130.0);
        assert_eq!(engine.unread_count("Alice"), 0);

        assert!(!engine.on_message_visible("Alice", 11, 110.0));
        assert_eq!(engine.contact("Alice").unwrap().last_message_id, Some(13));
    }

    #[test]
    fn test_stale_pointer_counts_everything() {
        let mut engine = bob_with_alice();
        engine.on_message_visible("Alice", 500, 1.0);
        assert_eq!(engine.unread_count("Alice"), 4);
    }

    #[test]
    fn test_open_conversation_reads_incoming() {
        let mut engine = bob_with_alice();
        assert!(engine.open_conversation("Alice"));
        let id = engine.receive("Alice", "seen right away", 140.0).unwrap();
        assert_eq!(engine.contact("Alice").unwrap().last_message_id, Some(id));
        assert_eq!(engine.unread_count("Alice"), 0);
    }

    #[test]
    fn test_open_conversation_requires_ready_contact() {
        let mut engine = SyncEngine::new("Bob");
        engine.directory.add_contact("Mallory", LookupStatus::Incoming);
        assert!(!engine.open_conversation("Mallory"));
        assert!(!engine.open_conversation("Nobody"));
        assert_eq!(engine.open_partner(), None);
    }

    #[test]
    fn test_send_needs_open_conversation() {
        let mut engine = bob_with_alice();
        assert!(matches!(engine.send("hi", 200.0), Err(SyncError::NoOpenConversation)));

        engine.open_conversation("Alice");
        assert_eq!(engine.send("", 200.0).unwrap(), None);

        let out = engine.send("hi", 200.0).unwrap().unwrap();
        assert_eq!(out.id, 14);
        assert_eq!(out.recipient_id, "Alice");
        assert_eq!(engine.contact("Alice").unwrap().last_message_id, Some(14));
        assert_eq!(engine.unread_count("Alice"), 0);
    }

    #[test]
    fn test_first_unread_and_pending_visibility() {
        let mut engine = bob_with_alice();
        assert_eq!(engine.first_unread("Alice"), Some(10));

        engine.on_message_visible("Alice", 11, 110.0);
        assert_eq!(engine.first_unread("Alice"), Some(12));
        assert_eq!(engine.pending_visibility("Alice"), vec![12, 13]);

        engine.on_message_visible("Alice", 13, 130.0);
        assert_eq!(engine.first_unread("Alice"), None);
        assert!(engine.pending_visibility("Alice").is_empty());
    }

    #[test]
    fn test_start_decodes_roster_and_skips_self() {
        let mut engine = SyncEngine::new("");
        let added = engine.start("%42ob", ["%42ob", "client10", "client2", "%41lice"]);
        assert_eq!(added, 3);
        assert_eq!(engine.local_id(), "Bob");
        let order: Vec<&str> = engine
            .directory()
            .iter()
            .map(|c| c.user_id.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["Alice", "client2", "client10"]);
    }

    #[test]
    fn test_receive_slug_scales_microseconds() {
        let mut engine = SyncEngine::new("Bob");
        let id = engine.receive_slug("%45ve", "hello", 1_680_155_434_500_000.0).unwrap();
        let msg = engine.log().get(id).unwrap();
        assert_eq!(msg.sender_id, "Eve");
        assert_eq!(msg.timestamp, 1_680_155_434.5);
    }

    #[test]
    fn test_summaries_only_count_ready_contacts() {
        let mut engine = bob_with_alice();
        engine.directory.add_contact("Mallory", LookupStatus::Incoming);
        engine.directory.begin_bootstrap("0xABADBEEF");

        let summaries = engine.contact_summaries();
        assert_eq!(summaries.len(), 3);
        let alice = summaries.iter().find(|s| s.contact.user_id.as_deref() == Some("Alice")).unwrap();
        assert_eq!(alice.unread, 4);
        assert!(summaries
            .iter()
            .filter(|s| s.contact.lookup_status != LookupStatus::Ready)
            .all(|s| s.unread == 0));
    }

    #[test]
    fn test_snapshot_rejects_unknown_partner() {
        let mut snapshot = bob_with_alice().snapshot();
        snapshot.current_partner_id = Some("Zed".to_string());
        assert!(matches!(SyncEngine::from_snapshot(snapshot), Err(SyncError::InvalidSnapshot(_))));
    }

    #[test]
    fn test_snapshot_rejects_partner_that_is_not_ready() {
        let mut engine = bob_with_alice();
        engine.directory.add_contact("Mallory", LookupStatus::Incoming);
        let mut snapshot = engine.snapshot();
        snapshot.current_partner_id = Some("Mallory".to_string());
        assert!(matches!(SyncEngine::from_snapshot(snapshot), Err(SyncError::InvalidSnapshot(_))));

        let mut snapshot = engine.snapshot();
        snapshot.current_partner_id = Some("Alice".to_string());
        let restored = SyncEngine::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.open_partner(), Some("Alice"));
    }

    #[test]
    fn test_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("snapshot.json");
        let mut engine = bob_with_alice();
        engine.on_message_visible("Alice", 12, 120.0);
        engine.snapshot().save(&path).unwrap();

        let restored = SyncEngine::from_snapshot(Snapshot::load(&path).unwrap()).unwrap();
        assert_eq!(restored.unread_count("Alice"), 1);
        assert_eq!(restored.log().last_id(), 13);
    }

    #[test]
    fn test_snapshot_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Snapshot::load(&dir.path().join("missing.json")),
            Err(SyncError::Io(_))
        ));
        assert!(matches!(
            Snapshot::from_reader("{\"my_id\": 5}".as_bytes()),
            Err(SyncError::Json(_))
        ));
    }

    #[test]
    fn test_visibility_for_foreign_message_is_rejected() {
        let mut engine = bob_with_alice();
        engine.receive("Carol", "not for alice", 140.0).unwrap();
        engine.on_message_visible("Alice", 13, 130.0);

        let updates = engine.apply(HostEvent::MessageVisible {
            user_id: "Alice".to_string(),
            message_id: "14".to_string(),
            timestamp: "999999".to_string(),
        });
        assert!(matches!(updates.as_slice(), [EngineUpdate::Rejected { .. }]));
        assert_eq!(engine.contact("Alice").unwrap().last_message_id, Some(13));
        assert_eq!(engine.unread_count("Alice"), 0);
    }

    #[test]
    fn test_visibility_takes_timestamp_from_log() {
        let mut engine = bob_with_alice();
        engine.apply(HostEvent::MessageVisible {
            user_id: "Alice".to_string(),
            message_id: "12".to_string(),
            timestamp: "999999".to_string(),
        });
        assert_eq!(engine.contact("Alice").unwrap().last_message_timestamp, Some(120.0));
    }
}
