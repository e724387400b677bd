//! Bote mail handling
//!
//! The user-facing half of the system. [`EmailSender`] splits an email into
//! fragments, encrypts each for the recipient and builds the index entries.
//! [`MailReceiver`] decrypts packets fetched from storage peers and feeds
//! the fragments to an [`IncompleteEmailFolder`], which hands each
//! completed email to the [`Inbox`] exactly once, using the
//! [`MessageIdCache`] to ignore fragments that arrive again later.

pub mod email;
pub mod error;
pub mod inbox;
pub mod incomplete;
pub mod message_id_cache;
pub mod receiver;
pub mod sender;

pub use email::Email;
pub use error::{MailError, Result};
pub use inbox::{FolderInbox, Inbox};
pub use incomplete::IncompleteEmailFolder;
pub use message_id_cache::MessageIdCache;
pub use receiver::{MailReceiver, ReceivedPacket};
pub use sender::{EmailSender, PreparedEmail, DEFAULT_FRAGMENT_SIZE};
