//! Error types for cryptographic operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Unknown crypto implementation id: {0}")]
    UnknownCryptoId(u8),

    #[error("Invalid {kind} length for {algorithm}: expected {expected}, got {actual}")]
    InvalidKeyLength {
        algorithm: &'static str,
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Signing key exhausted after {0} signatures")]
    KeyExhausted(u64),

    #[error("Crypto implementation mismatch: expected {expected}, got {actual}")]
    CryptoIdMismatch { expected: u8, actual: u8 },

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Plaintext too large: {size} bytes (max: {max})")]
    PlaintextTooLarge { size: usize, max: usize },

    #[error("Failed to persist updated signing key: {0}")]
    KeyPersistence(String),
}
