//! Reassembly of email fragments
//!
//! Each received fragment is kept as one folder entry named
//! `<message id>_<fragment index>` until all fragments of the message are
//! present. Entries hold the receive time (u32) followed by the encoded
//! `U` packet.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use bote_dht::expiration::cutoff;
use bote_dht::{Expirable, Folder};
use bote_protocol::{now, UnencryptedEmailPacket, UniqueId, WirePacket};
use tracing::{debug, info, warn};

use crate::email::Email;
use crate::error::Result;
use crate::inbox::Inbox;
use crate::message_id_cache::MessageIdCache;

/// Default age after which incomplete fragment sets are dropped (30 days)
pub const DEFAULT_MAX_AGE_SECS: u32 = 30 * 24 * 60 * 60;

const SEPARATOR: char = '_';

fn entry_name(message_id: &UniqueId, fragment_index: u16) -> String {
    format!("{}{}{:05}", message_id.to_base64(), SEPARATOR, fragment_index)
}

fn message_prefix(message_id: &UniqueId) -> String {
    format!("{}{}", message_id.to_base64(), SEPARATOR)
}

struct StoredFragment {
    received: u32,
    packet: UnencryptedEmailPacket,
}

/// Fragments waiting for the rest of their email
pub struct IncompleteEmailFolder {
    folder: Box<dyn Folder>,
    cache: Arc<MessageIdCache>,
    inbox: Arc<dyn Inbox>,
    max_age_secs: u32,
    lock: Mutex<()>,
}

impl IncompleteEmailFolder {
    pub fn new(folder: Box<dyn Folder>, cache: Arc<MessageIdCache>, inbox: Arc<dyn Inbox>) -> Self {
        IncompleteEmailFolder {
            folder,
            cache,
            inbox,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            lock: Mutex::new(()),
        }
    }

    pub fn with_max_age(mut self, max_age_secs: u32) -> Self {
        self.max_age_secs = max_age_secs;
        self
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_email_fragment(&self, fragment: UnencryptedEmailPacket) -> Result<bool> {
        self.add_email_fragment_at(fragment, now())
    }

    /// Store a fragment and assemble its email once all fragments are here
    ///
    /// Returns `true` only for the call that completed the email. Fragments
    /// of an email that was already assembled are dropped.
    pub fn add_email_fragment_at(&self, fragment: UnencryptedEmailPacket, received: u32) -> Result<bool> {
        let _guard = self.guard();
        let message_id = *fragment.message_id();
        if self.cache.contains(&message_id) {
            debug!(
                "dropping fragment {} of delivered email {}",
                fragment.fragment_index(),
                message_id.to_base64()
            );
            return Ok(false);
        }

        let mut entry = received.to_be_bytes().to_vec();
        entry.extend_from_slice(&fragment.to_bytes()?);
        self.folder
            .put(&entry_name(&message_id, fragment.fragment_index()), &entry)?;

        let num_fragments = fragment.num_fragments();
        let fragments = self.load_message(&message_id)?;
        let complete: BTreeMap<u16, &UnencryptedEmailPacket> = fragments
            .values()
            .map(|f| &f.packet)
            .filter(|p| p.num_fragments() == num_fragments)
            .map(|p| (p.fragment_index(), p))
            .collect();
        if complete.len() != num_fragments as usize {
            debug!(
                "email {}: {} of {} fragments",
                message_id.to_base64(),
                complete.len(),
                num_fragments
            );
            return Ok(false);
        }

        let mut content = Vec::new();
        for packet in complete.values() {
            content.extend_from_slice(packet.content());
        }
        self.inbox
            .deliver(Email::with_message_id(message_id, content))?;

        for name in fragments.keys() {
            self.folder.delete(name)?;
        }
        self.cache.add(message_id)?;
        Ok(true)
    }

    /// Fragments of one message, by entry name; unreadable entries are skipped
    fn load_message(&self, message_id: &UniqueId) -> Result<BTreeMap<String, StoredFragment>> {
        let mut fragments = BTreeMap::new();
        for name in self.folder.list_prefix(&message_prefix(message_id))? {
            if let Some(fragment) = self.load(&name)? {
                fragments.insert(name, fragment);
            }
        }
        Ok(fragments)
    }

    fn load(&self, name: &str) -> Result<Option<StoredFragment>> {
        let Some(bytes) = self.folder.get(name)? else {
            return Ok(None);
        };
        if bytes.len() < 4 {
            warn!("skipping truncated fragment file {}", name);
            return Ok(None);
        }
        let mut received = [0u8; 4];
        received.copy_from_slice(&bytes[..4]);
        match UnencryptedEmailPacket::from_bytes(&bytes[4..]) {
            Ok(packet) => Ok(Some(StoredFragment {
                received: u32::from_be_bytes(received),
                packet,
            })),
            Err(e) => {
                warn!("skipping corrupt fragment file {}: {}", name, e);
                Ok(None)
            }
        }
    }

    /// Number of stored fragment entries
    pub fn len(&self) -> Result<usize> {
        Ok(self.folder.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Expirable for IncompleteEmailFolder {
    /// Drops every fragment of a message whose oldest fragment is too old
    fn delete_expired_at(&self, now: u32) -> bote_dht::Result<usize> {
        let cutoff = cutoff(now, self.max_age_secs);
        let _guard = self.guard();

        let mut messages: HashMap<String, (u32, Vec<String>)> = HashMap::new();
        for name in self.folder.list()? {
            let Some((id, _)) = name.split_once(SEPARATOR) else {
                continue;
            };
            let received = match self.load(&name) {
                Ok(Some(fragment)) => fragment.received,
                Ok(None) => continue,
                Err(e) => {
                    warn!("skipping fragment file {}: {}", name, e);
                    continue;
                }
            };
            let message = messages
                .entry(id.to_string())
                .or_insert((u32::MAX, Vec::new()));
            message.0 = message.0.min(received);
            message.1.push(name);
        }

        let mut removed = 0;
        for (id, (oldest, names)) in messages {
            if oldest >= cutoff {
                continue;
            }
            for name in &names {
                if self.folder.delete(name)? {
                    removed += 1;
                }
            }
            info!("dropped {} fragments of incomplete email {}", names.len(), id);
        }
        Ok(removed)
    }
}
