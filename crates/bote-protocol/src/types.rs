//! Core protocol types

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bote_crypto::i2p_base64;

/// Size of a DHT key / SHA-256 digest in bytes
pub const HASH_SIZE: usize = 32;

/// Size of a unique id in bytes
pub const UNIQUE_ID_SIZE: usize = 32;

/// A 32-byte SHA-256 digest, used as a DHT key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a Hash from a byte array
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    /// SHA-256 of `data`
    pub fn digest(data: &[u8]) -> Self {
        Hash(Sha256::digest(data).into())
    }

    /// Get the bytes of this Hash
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let arr: [u8; HASH_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            format!("Invalid hash length: expected {}, got {}", HASH_SIZE, b.len())
        })?;
        Ok(Hash(arr))
    }

    /// Encode as I2P base64 (the form used in file names)
    pub fn to_base64(&self) -> String {
        i2p_base64::encode(&self.0)
    }

    /// Parse from I2P base64
    pub fn from_base64(s: &str) -> Result<Self, String> {
        let bytes = i2p_base64::decode(s).map_err(|e| e.to_string())?;
        let arr: [u8; HASH_SIZE] = bytes
            .try_into()
            .map_err(|_| "Invalid hash length".to_string())?;
        Ok(Hash(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_base64()[..12])
    }
}

/// 32 random bytes: message ids, packet ids and delete authorizations
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct UniqueId([u8; UNIQUE_ID_SIZE]);

impl UniqueId {
    /// Generate a new random id
    pub fn random() -> Self {
        let mut bytes = [0u8; UNIQUE_ID_SIZE];
        OsRng.fill_bytes(&mut bytes);
        UniqueId(bytes)
    }

    pub fn from_bytes(bytes: [u8; UNIQUE_ID_SIZE]) -> Self {
        UniqueId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; UNIQUE_ID_SIZE] {
        &self.0
    }

    /// SHA-256 of the id; for a delete authorization this is the verification hash
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.0)
    }

    pub fn to_base64(&self) -> String {
        i2p_base64::encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, String> {
        let bytes = i2p_base64::decode(s).map_err(|e| e.to_string())?;
        let arr: [u8; UNIQUE_ID_SIZE] = bytes
            .try_into()
            .map_err(|_| "Invalid unique id length".to_string())?;
        Ok(UniqueId(arr))
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", self.to_base64())
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// Current time in whole seconds since the Unix epoch
pub fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}
