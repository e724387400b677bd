//! The delivered unit of mail

use bote_protocol::UniqueId;

/// An assembled email: its message id and content bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    message_id: UniqueId,
    content: Vec<u8>,
}

impl Email {
    /// New email with a random message id
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self::with_message_id(UniqueId::random(), content)
    }

    pub fn with_message_id(message_id: UniqueId, content: impl Into<Vec<u8>>) -> Self {
        Email {
            message_id,
            content: content.into(),
        }
    }

    pub fn message_id(&self) -> &UniqueId {
        &self.message_id
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}
