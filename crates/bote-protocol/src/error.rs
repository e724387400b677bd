//! Error types for protocol operations

use bote_crypto::CryptoError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Truncated packet: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Length mismatch in {field}: declared {declared}, actual {actual}")]
    LengthMismatch {
        field: &'static str,
        declared: usize,
        actual: usize,
    },

    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),

    #[error("Invalid field value: {0}")]
    InvalidField(String),

    #[error("Packet too large: {size} bytes (max: {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Unexpected packet type: expected {expected}, got {actual}")]
    UnexpectedPacketType { expected: char, actual: char },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
