// Contact directory
// One record per resolved user_id, plus any handshakes still in flight.

use log::{debug, info};
use std::cmp::Ordering;

use crate::error::{Result, SyncError};
use crate::models::{Contact, LookupStatus};

#[derive(Debug, Clone, Default)]
pub struct ContactDirectory {
    contacts: Vec<Contact>,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a directory from existing records, checking every invariant.
    pub(crate) fn from_contacts(contacts: Vec<Contact>) -> Result<Self> {
        for (i, contact) in contacts.iter().enumerate() {
            contact.check().map_err(SyncError::InvalidSnapshot)?;
            if let Some(uid) = contact.user_id.as_deref() {
                if contacts[..i].iter().any(|c| c.is(uid)) {
                    return Err(SyncError::InvalidSnapshot(format!("duplicate contact {}", uid)));
                }
            }
        }
        Ok(ContactDirectory { contacts })
    }

    /// Add a resolved contact unless one already exists for `user_id`.
    ///
    /// Returns true when a record was created. Empty ids are ignored.
    pub fn add_contact(&mut self, user_id: &str, status: LookupStatus) -> bool {
        if user_id.is_empty() || status == LookupStatus::Bootstrapping || self.lookup(user_id).is_some() {
            return false;
        }
        debug!("Adding contact {} as {:?}", user_id, status);
        self.contacts.push(Contact::resolved(user_id, status));
        true
    }

    /// Make sure a message sender has a conversation partner entry.
    pub fn upsert_incoming(&mut self, user_id: &str) -> bool {
        let created = self.add_contact(user_id, LookupStatus::Ready);
        if created {
            info!("Auto-provisioned contact for unknown sender {}", user_id);
        }
        created
    }

    pub fn lookup(&self, user_id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.is(user_id))
    }

    fn lookup_mut(&mut self, user_id: &str) -> Option<&mut Contact> {
        self.contacts.iter_mut().find(|c| c.is(user_id))
    }

    /// Move the read pointer forward. Never moves it back.
    ///
    /// Returns true if the pointer changed.
    pub fn advance_read_pointer(&mut self, user_id: &str, message_id: u64, timestamp: f64) -> bool {
        let Some(contact) = self.lookup_mut(user_id) else {
            debug!("Ignoring read pointer update for unknown contact {}", user_id);
            return false;
        };
        if contact.last_message_id.map_or(false, |current| message_id <= current) {
            return false;
        }
        debug!("Read pointer for {} -> {}", user_id, message_id);
        contact.last_message_id = Some(message_id);
        contact.last_message_timestamp = Some(timestamp);
        true
    }

    /// Record an identity exchange we started.
    pub fn begin_bootstrap(&mut self, bootstrap_id: &str) -> bool {
        if bootstrap_id.is_empty() || self.find_bootstrap(bootstrap_id).is_some() {
            return false;
        }
        debug!("Bootstrapping contact {}", bootstrap_id);
        self.contacts.push(Contact::bootstrapping(bootstrap_id));
        true
    }

    /// Finish an identity exchange, turning it into a ready contact.
    ///
    /// If `user_id` is already known the handshake entry is dropped so the
    /// directory never holds two records for the same identity.
    pub fn resolve_bootstrap(&mut self, bootstrap_id: &str, user_id: &str) -> bool {
        if user_id.is_empty() {
            return false;
        }
        let Some(index) = self.find_bootstrap(bootstrap_id) else {
            return false;
        };

        if self.lookup(user_id).is_some() {
            info!("Bootstrap {} resolved to existing contact {}", bootstrap_id, user_id);
            self.contacts.remove(index);
            return true;
        }

        info!("Bootstrap {} resolved to {}", bootstrap_id, user_id);
        let contact = &mut self.contacts[index];
        contact.user_id = Some(user_id.to_string());
        contact.bootstrap_id = None;
        contact.lookup_status = LookupStatus::Ready;
        true
    }

    /// Accept a remote party's request to chat.
    pub fn accept_incoming(&mut self, user_id: &str) -> bool {
        match self.lookup_mut(user_id) {
            Some(contact) if contact.lookup_status == LookupStatus::Incoming => {
                debug!("Accepted incoming contact {}", user_id);
                contact.lookup_status = LookupStatus::Ready;
                true
            }
            _ => false,
        }
    }

    /// Add a batch of ready contacts and order the whole directory by
    /// user_id, comparing digit runs numerically.
    pub fn populate_ready<'a, I>(&mut self, user_ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let added = user_ids
            .into_iter()
            .filter(|uid| self.add_contact(uid, LookupStatus::Ready))
            .count();
        self.contacts.sort_by(|a, b| {
            natural_cmp(a.user_id.as_deref().unwrap_or(""), b.user_id.as_deref().unwrap_or(""))
        });
        added
    }

    /// Contacts ordered for listing: newest read pointer first, then the
    /// ones that have never read anything. Ties keep insertion order.
    pub fn sorted_for_display(&self) -> Vec<&Contact> {
        let mut sorted: Vec<&Contact> = self.contacts.iter().collect();
        sorted.sort_by(|a, b| match (a.last_message_timestamp, b.last_message_timestamp) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        sorted
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    fn find_bootstrap(&self, bootstrap_id: &str) -> Option<usize> {
        self.contacts.iter().position(|c| {
            c.lookup_status == LookupStatus::Bootstrapping && c.bootstrap_id.as_deref() == Some(bootstrap_id)
        })
    }
}

/// Compare two identities so that "user2" sorts before "user10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut xs = a.chars().peekable();
    let mut ys = b.chars().peekable();

    loop {
        match (xs.peek().copied(), ys.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_digits(&mut xs);
                let right = take_digits(&mut ys);
                let ord = cmp_digit_runs(&left, &right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_lowercase().cmp(y.to_lowercase()).then(x.cmp(&y));
                if ord != Ordering::Equal {
                    return ord;
                }
                xs.next();
                ys.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = it.peek().copied().filter(char::is_ascii_digit) {
        run.push(c);
        it.next();
    }
    run
}

fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.len().cmp(&b.len()))
}
