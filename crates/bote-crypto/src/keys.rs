//! Crypto implementation ids and fixed-length key encodings
//!
//! Every key is tagged with the id of the implementation that produced it and
//! always encodes to the same number of bytes for that id. Keys of the wrong
//! length are rejected when they are constructed, so implementations can rely
//! on the length of any key they receive.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};
use crate::i2p_base64;

/// Stable one-byte identifier of a hybrid crypto implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum CryptoId {
    /// ElGamal-2048 encryption, DSA-1024 signatures
    ElGamal2048Dsa1024 = 1,
    /// ECDH and ECDSA over NIST P-256
    Ecdh256Ecdsa256 = 2,
    /// ECDH and ECDSA over NIST P-521
    Ecdh521Ecdsa521 = 3,
    /// Post-quantum lattice key wrap with stateful hash-based signatures
    Ntru1087Gmss512 = 4,
}

impl CryptoId {
    /// All implementation ids in ascending order
    pub const ALL: [CryptoId; 4] = [
        CryptoId::ElGamal2048Dsa1024,
        CryptoId::Ecdh256Ecdsa256,
        CryptoId::Ecdh521Ecdsa521,
        CryptoId::Ntru1087Gmss512,
    ];

    /// Convert from the wire byte
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(CryptoId::ElGamal2048Dsa1024),
            2 => Ok(CryptoId::Ecdh256Ecdsa256),
            3 => Ok(CryptoId::Ecdh521Ecdsa521),
            4 => Ok(CryptoId::Ntru1087Gmss512),
            other => Err(CryptoError::UnknownCryptoId(other)),
        }
    }

    /// Convert to the wire byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Human readable algorithm name
    pub fn name(self) -> &'static str {
        match self {
            CryptoId::ElGamal2048Dsa1024 => "ElGamal-2048 / DSA-1024",
            CryptoId::Ecdh256Ecdsa256 => "ECDH-256 / ECDSA-256",
            CryptoId::Ecdh521Ecdsa521 => "ECDH-521 / ECDSA-521",
            CryptoId::Ntru1087Gmss512 => "NTRUEncrypt-1087 / GMSS-512",
        }
    }

    /// Encoded key lengths for this implementation
    pub fn key_lengths(self) -> KeyLengths {
        match self {
            CryptoId::ElGamal2048Dsa1024 => KeyLengths {
                encryption_public: 256,
                encryption_private: 256,
                signing_public: 128,
                signing_private: 20,
                signature: 40,
            },
            CryptoId::Ecdh256Ecdsa256 => KeyLengths {
                encryption_public: 33,
                encryption_private: 32,
                signing_public: 33,
                signing_private: 32,
                signature: 64,
            },
            CryptoId::Ecdh521Ecdsa521 => KeyLengths {
                encryption_public: 66,
                encryption_private: 66,
                signing_public: 66,
                signing_private: 66,
                signature: 132,
            },
            CryptoId::Ntru1087Gmss512 => KeyLengths {
                encryption_public: 1568,
                encryption_private: 3168,
                signing_public: 33,
                signing_private: 37,
                signature: crate::gmss::signature_len(crate::gmss::DEFAULT_HEIGHT),
            },
        }
    }

    /// Length of a destination: both public keys, base64 encoded
    pub fn destination_base64_len(self) -> usize {
        let lengths = self.key_lengths();
        i2p_base64::encoded_len(lengths.encryption_public + lengths.signing_public)
    }
}

impl TryFrom<u8> for CryptoId {
    type Error = CryptoError;

    fn try_from(value: u8) -> Result<Self> {
        CryptoId::from_u8(value)
    }
}

impl From<CryptoId> for u8 {
    fn from(id: CryptoId) -> u8 {
        id.to_u8()
    }
}

impl fmt::Display for CryptoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.to_u8())
    }
}

/// Fixed byte lengths of every key type of one implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLengths {
    pub encryption_public: usize,
    pub encryption_private: usize,
    pub signing_public: usize,
    pub signing_private: usize,
    /// Signature length (for the stateful scheme: at the default tree height)
    pub signature: usize,
}

/// Role of a key: which entry of [`KeyLengths`] it must match
pub trait KeyRole {
    const NAME: &'static str;
    const PRIVATE: bool;

    fn length(lengths: &KeyLengths) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionPublic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionPrivate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningPublic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningPrivate;

impl KeyRole for EncryptionPublic {
    const NAME: &'static str = "encryption public key";
    const PRIVATE: bool = false;

    fn length(lengths: &KeyLengths) -> usize {
        lengths.encryption_public
    }
}

impl KeyRole for EncryptionPrivate {
    const NAME: &'static str = "encryption private key";
    const PRIVATE: bool = true;

    fn length(lengths: &KeyLengths) -> usize {
        lengths.encryption_private
    }
}

impl KeyRole for SigningPublic {
    const NAME: &'static str = "signing public key";
    const PRIVATE: bool = false;

    fn length(lengths: &KeyLengths) -> usize {
        lengths.signing_public
    }
}

impl KeyRole for SigningPrivate {
    const NAME: &'static str = "signing private key";
    const PRIVATE: bool = true;

    fn length(lengths: &KeyLengths) -> usize {
        lengths.signing_private
    }
}

/// A key of one role, encoded at the fixed length of its implementation
pub struct Key<R: KeyRole> {
    crypto_id: CryptoId,
    bytes: Vec<u8>,
    _role: PhantomData<R>,
}

pub type EncryptionPublicKey = Key<EncryptionPublic>;
pub type EncryptionPrivateKey = Key<EncryptionPrivate>;
pub type SigningPublicKey = Key<SigningPublic>;
pub type SigningPrivateKey = Key<SigningPrivate>;

impl<R: KeyRole> Key<R> {
    /// Create a key from its fixed-length encoding
    pub fn from_bytes(crypto_id: CryptoId, bytes: &[u8]) -> Result<Self> {
        let expected = Self::encoded_len(crypto_id);
        if bytes.len() != expected {
            return Err(CryptoError::InvalidKeyLength {
                algorithm: crypto_id.name(),
                kind: R::NAME,
                expected,
                actual: bytes.len(),
            });
        }

        Ok(Key {
            crypto_id,
            bytes: bytes.to_vec(),
            _role: PhantomData,
        })
    }

    /// Create a key from I2P base64
    pub fn from_base64(crypto_id: CryptoId, s: &str) -> Result<Self> {
        let mut bytes = i2p_base64::decode(s)?;
        let key = Self::from_bytes(crypto_id, &bytes);
        bytes.zeroize();
        key
    }

    /// Fixed encoded length for keys of this role
    pub fn encoded_len(crypto_id: CryptoId) -> usize {
        R::length(&crypto_id.key_lengths())
    }

    /// Implementation that owns this key
    pub fn crypto_id(&self) -> CryptoId {
        self.crypto_id
    }

    /// Get the encoded key
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encode as I2P base64
    pub fn to_base64(&self) -> String {
        i2p_base64::encode(&self.bytes)
    }

    /// Fail unless this key belongs to `expected`
    pub(crate) fn ensure_id(&self, expected: CryptoId) -> Result<()> {
        if self.crypto_id != expected {
            return Err(CryptoError::CryptoIdMismatch {
                expected: expected.to_u8(),
                actual: self.crypto_id.to_u8(),
            });
        }
        Ok(())
    }
}

impl<R: KeyRole> Clone for Key<R> {
    fn clone(&self) -> Self {
        Key {
            crypto_id: self.crypto_id,
            bytes: self.bytes.clone(),
            _role: PhantomData,
        }
    }
}

impl<R: KeyRole> PartialEq for Key<R> {
    fn eq(&self, other: &Self) -> bool {
        self.crypto_id == other.crypto_id && self.bytes == other.bytes
    }
}

impl<R: KeyRole> Eq for Key<R> {}

impl<R: KeyRole> Drop for Key<R> {
    fn drop(&mut self) {
        if R::PRIVATE {
            self.bytes.zeroize();
        }
    }
}

impl<R: KeyRole> fmt::Debug for Key<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if R::PRIVATE {
            write!(f, "Key({}, {}, <redacted>)", R::NAME, self.crypto_id.to_u8())
        } else {
            let prefix = &self.bytes[..self.bytes.len().min(8)];
            write!(
                f,
                "Key({}, {}, {}..)",
                R::NAME,
                self.crypto_id.to_u8(),
                hex::encode(prefix)
            )
        }
    }
}

/// Encryption key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKeyPair {
    pub public: EncryptionPublicKey,
    pub private: EncryptionPrivateKey,
}

/// Signing key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyPair {
    pub public: SigningPublicKey,
    pub private: SigningPrivateKey,
}

/// Result of a signing operation
///
/// Stateful schemes return the evolved private key in `updated_key`. The
/// caller must persist it before the signature is used and must never sign
/// with the old key again.
#[derive(Debug, Clone)]
pub struct Signature {
    pub bytes: Vec<u8>,
    pub updated_key: Option<SigningPrivateKey>,
}

/// Left-pad a big-endian integer encoding to exactly `len` bytes
pub(crate) fn pad_to(bytes: &[u8], len: usize, what: &'static str) -> Result<Vec<u8>> {
    let significant = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => &[][..],
    };
    if significant.len() > len {
        return Err(CryptoError::InvalidKey(format!(
            "{} needs {} bytes, encoding holds {}",
            what,
            significant.len(),
            len
        )));
    }
    let mut out = vec![0u8; len - significant.len()];
    out.extend_from_slice(significant);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_id_round_trip() {
        for id in CryptoId::ALL {
            assert_eq!(CryptoId::from_u8(id.to_u8()).unwrap(), id);
        }
        assert_eq!(CryptoId::from_u8(0), Err(CryptoError::UnknownCryptoId(0)));
        assert_eq!(CryptoId::from_u8(5), Err(CryptoError::UnknownCryptoId(5)));
    }

    #[test]
    fn test_destination_lengths_are_distinct() {
        let lengths: Vec<usize> = CryptoId::ALL
            .iter()
            .map(|id| id.destination_base64_len())
            .collect();
        assert_eq!(lengths, vec![512, 88, 176, 2136]);
    }

    #[test]
    fn test_key_length_enforced() {
        let key = EncryptionPublicKey::from_bytes(CryptoId::Ecdh256Ecdsa256, &[2u8; 33]).unwrap();
        assert_eq!(key.as_bytes().len(), 33);

        let err = EncryptionPublicKey::from_bytes(CryptoId::Ecdh256Ecdsa256, &[2u8; 34]);
        assert!(matches!(
            err,
            Err(CryptoError::InvalidKeyLength {
                expected: 33,
                actual: 34,
                ..
            })
        ));
    }

    #[test]
    fn test_base64_round_trip() {
        let key = SigningPrivateKey::from_bytes(CryptoId::ElGamal2048Dsa1024, &[7u8; 20]).unwrap();
        let decoded =
            SigningPrivateKey::from_base64(CryptoId::ElGamal2048Dsa1024, &key.to_base64()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = SigningPrivateKey::from_bytes(CryptoId::Ecdh256Ecdsa256, &[0xAB; 32]).unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains("redacted"));
        assert!(!debug.contains("abab"));
    }

    #[test]
    fn test_pad_to() {
        assert_eq!(pad_to(&[1, 2], 4, "x").unwrap(), vec![0, 0, 1, 2]);
        assert_eq!(pad_to(&[0, 0, 1, 2], 2, "x").unwrap(), vec![1, 2]);
        assert!(pad_to(&[1, 2, 3], 2, "x").is_err());
    }
}
