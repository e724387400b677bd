//! Bote DHT storage
//!
//! The storage-peer half of the system:
//! - [`Folder`] storage contract with file, memory and encrypted backends
//! - [`EmailPacketStore`] for encrypted email packets and their deletion records
//! - [`IndexPacketStore`] for per-destination index packets
//! - [`Expirable`] sweeps that drop packets older than the retention window
//!
//! Peer discovery and datagram transport live outside this crate.

pub mod email_packet_store;
pub mod error;
pub mod expiration;
pub mod folder;
pub mod index_store;
pub mod quota;

pub use email_packet_store::EmailPacketStore;
pub use error::{DhtError, PasswordError, Result};
pub use expiration::{Expirable, EXPIRATION_TIME_SECS};
pub use folder::{
    EncryptedFolder, FileFolder, Folder, FolderCipher, KeySource, MemoryFolder,
    PasswordKeySource, StaticKeySource,
};
pub use index_store::IndexPacketStore;
pub use quota::StorageQuota;

/// Default byte budget for stored packets (100 MiB)
pub const DEFAULT_MAX_STORAGE_BYTES: u64 = 100 * 1024 * 1024;
