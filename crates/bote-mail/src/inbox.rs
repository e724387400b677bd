//! Destination for assembled emails

use bote_dht::Folder;
use bote_protocol::UniqueId;
use tracing::{info, warn};

use crate::email::Email;
use crate::error::Result;

/// Receives each assembled email exactly once
pub trait Inbox: Send + Sync {
    fn deliver(&self, email: Email) -> Result<()>;
}

/// Inbox keeping one folder entry per email, named by message id
pub struct FolderInbox {
    folder: Box<dyn Folder>,
}

impl FolderInbox {
    pub fn new(folder: Box<dyn Folder>) -> Self {
        FolderInbox { folder }
    }

    pub fn get(&self, message_id: &UniqueId) -> Result<Option<Email>> {
        Ok(self
            .folder
            .get(&message_id.to_base64())?
            .map(|content| Email::with_message_id(*message_id, content)))
    }

    /// All emails in the inbox
    pub fn emails(&self) -> Result<Vec<Email>> {
        let mut emails = Vec::new();
        for name in self.folder.list()? {
            let Ok(id) = UniqueId::from_base64(&name) else {
                warn!("ignoring inbox entry {}", name);
                continue;
            };
            if let Some(email) = self.get(&id)? {
                emails.push(email);
            }
        }
        Ok(emails)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.folder.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Inbox for FolderInbox {
    fn deliver(&self, email: Email) -> Result<()> {
        self.folder
            .put(&email.message_id().to_base64(), email.content())?;
        info!(
            "delivered email {} ({} bytes)",
            email.message_id().to_base64(),
            email.content().len()
        );
        Ok(())
    }
}
