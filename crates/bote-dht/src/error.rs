//! Storage error types

use bote_protocol::Hash;
use thiserror::Error;

/// Failure to obtain a folder cipher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("No password available")]
    Missing,

    #[error("Key derivation failed: {0}")]
    Derivation(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum DhtError {
    #[error("DHT key {declared} does not match payload (expected {computed})")]
    InvalidDhtKey { declared: Hash, computed: Hash },

    #[error("Packet {0} was deleted and cannot be stored again")]
    AlreadyDeleted(Hash),

    #[error("Storage full (max {max} bytes)")]
    StorageFull { max: u64 },

    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    #[error("Corrupt entry {name}: {reason}")]
    CorruptEntry { name: String, reason: String },

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] bote_protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, DhtError>;
