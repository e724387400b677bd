//! Email destinations and identities
//!
//! An [`EmailDestination`] is the public half: the encryption and signing
//! public keys of one crypto implementation. It is shared as the base64 of
//! both keys; the implementation is recognised by the length of that string.
//!
//! An [`EmailIdentity`] adds the private keys and a display name.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CryptoError, Result};
use crate::keys::{
    CryptoId, EncryptionPrivateKey, EncryptionPublicKey, SigningPrivateKey, SigningPublicKey,
};
use crate::registry::CryptoRegistry;

/// Public identity of a mail recipient
#[derive(Clone, PartialEq, Eq)]
pub struct EmailDestination {
    crypto_id: CryptoId,
    encryption_key: EncryptionPublicKey,
    signing_key: SigningPublicKey,
}

impl EmailDestination {
    /// Create a destination from two public keys of the same implementation
    pub fn new(encryption_key: EncryptionPublicKey, signing_key: SigningPublicKey) -> Result<Self> {
        let crypto_id = encryption_key.crypto_id();
        signing_key.ensure_id(crypto_id)?;
        Ok(EmailDestination {
            crypto_id,
            encryption_key,
            signing_key,
        })
    }

    /// Parse the base64 form, detecting the implementation from its length
    pub fn from_base64(registry: &CryptoRegistry, s: &str) -> Result<Self> {
        let s = s.trim();
        let imp = registry
            .iter()
            .find(|imp| imp.id().destination_base64_len() == s.len())
            .ok_or_else(|| {
                CryptoError::InvalidKey(format!("no implementation has {}-character destinations", s.len()))
            })?;
        let (encryption_key, signing_key) = imp.public_keys_from_base64(s)?;
        Self::new(encryption_key, signing_key)
    }

    pub fn to_base64(&self) -> String {
        let mut bytes = self.encryption_key.as_bytes().to_vec();
        bytes.extend_from_slice(self.signing_key.as_bytes());
        crate::i2p_base64::encode(&bytes)
    }

    pub fn crypto_id(&self) -> CryptoId {
        self.crypto_id
    }

    pub fn encryption_key(&self) -> &EncryptionPublicKey {
        &self.encryption_key
    }

    pub fn signing_key(&self) -> &SigningPublicKey {
        &self.signing_key
    }

    /// SHA-256 of both public keys; the DHT key of this destination's index
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.encryption_key.as_bytes());
        hasher.update(self.signing_key.as_bytes());
        hasher.finalize().into()
    }
}

impl fmt::Debug for EmailDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        write!(f, "EmailDestination({}, {}...)", self.crypto_id.to_u8(), &b64[..12])
    }
}

impl fmt::Display for EmailDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// A destination together with its private keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IdentityRecord", into = "IdentityRecord")]
pub struct EmailIdentity {
    public_name: String,
    destination: EmailDestination,
    encryption_private: EncryptionPrivateKey,
    signing_private: SigningPrivateKey,
}

impl EmailIdentity {
    /// Generate a new identity. Slow for the post-quantum implementation.
    pub fn generate(registry: &CryptoRegistry, crypto_id: CryptoId, public_name: &str) -> Result<Self> {
        let imp = registry.get(crypto_id);
        let encryption = imp.generate_encryption_key_pair()?;
        let signing = imp.generate_signing_key_pair()?;

        Ok(EmailIdentity {
            public_name: public_name.to_string(),
            destination: EmailDestination::new(encryption.public, signing.public)?,
            encryption_private: encryption.private,
            signing_private: signing.private,
        })
    }

    pub fn public_name(&self) -> &str {
        &self.public_name
    }

    pub fn destination(&self) -> &EmailDestination {
        &self.destination
    }

    pub fn crypto_id(&self) -> CryptoId {
        self.destination.crypto_id()
    }

    pub fn encryption_private_key(&self) -> &EncryptionPrivateKey {
        &self.encryption_private
    }

    /// Decrypt data addressed to this identity
    pub fn decrypt(&self, registry: &CryptoRegistry, data: &[u8]) -> Result<Vec<u8>> {
        registry.get(self.crypto_id()).decrypt(
            data,
            self.destination.encryption_key(),
            &self.encryption_private,
        )
    }

    /// Sign `data`
    ///
    /// When the signing key evolves, `persist` receives the identity holding
    /// the new key and must store it durably. Only if it succeeds does this
    /// identity switch to the new key and the signature get returned.
    pub fn sign<F, E>(&mut self, registry: &CryptoRegistry, data: &[u8], persist: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&EmailIdentity) -> std::result::Result<(), E>,
        E: fmt::Display,
    {
        let signature = registry.get(self.crypto_id()).sign(data, &self.signing_private)?;

        if let Some(updated_key) = signature.updated_key {
            let mut next = self.clone();
            next.signing_private = updated_key;
            persist(&next).map_err(|e| CryptoError::KeyPersistence(e.to_string()))?;
            debug!("persisted evolved signing key for {}", self.public_name);
            *self = next;
        }

        Ok(signature.bytes)
    }

    /// Verify a signature made by `destination`
    pub fn verify(
        registry: &CryptoRegistry,
        destination: &EmailDestination,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        registry
            .get(destination.crypto_id())
            .verify(data, signature, destination.signing_key())
    }
}

/// On-disk form of an identity, keys as I2P base64
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityRecord {
    public_name: String,
    crypto_id: CryptoId,
    encryption_public_key: String,
    encryption_private_key: String,
    signing_public_key: String,
    signing_private_key: String,
}

impl From<EmailIdentity> for IdentityRecord {
    fn from(identity: EmailIdentity) -> Self {
        IdentityRecord {
            public_name: identity.public_name.clone(),
            crypto_id: identity.crypto_id(),
            encryption_public_key: identity.destination.encryption_key.to_base64(),
            encryption_private_key: identity.encryption_private.to_base64(),
            signing_public_key: identity.destination.signing_key.to_base64(),
            signing_private_key: identity.signing_private.to_base64(),
        }
    }
}

impl TryFrom<IdentityRecord> for EmailIdentity {
    type Error = CryptoError;

    fn try_from(record: IdentityRecord) -> Result<Self> {
        let id = record.crypto_id;
        let destination = EmailDestination::new(
            EncryptionPublicKey::from_base64(id, &record.encryption_public_key)?,
            SigningPublicKey::from_base64(id, &record.signing_public_key)?,
        )?;

        Ok(EmailIdentity {
            public_name: record.public_name,
            destination,
            encryption_private: EncryptionPrivateKey::from_base64(id, &record.encryption_private_key)?,
            signing_private: SigningPrivateKey::from_base64(id, &record.signing_private_key)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_destination_base64_detects_implementation() {
        let registry = CryptoRegistry::new();
        for id in [CryptoId::Ecdh256Ecdsa256, CryptoId::Ecdh521Ecdsa521] {
            let identity = EmailIdentity::generate(&registry, id, "alice").unwrap();
            let b64 = identity.destination().to_base64();
            let parsed = EmailDestination::from_base64(&registry, &b64).unwrap();
            assert_eq!(parsed.crypto_id(), id);
            assert_eq!(&parsed, identity.destination());
            assert_eq!(parsed.hash(), identity.destination().hash());
        }
    }

    #[test]
    fn test_destination_unknown_length() {
        let registry = CryptoRegistry::new();
        assert!(EmailDestination::from_base64(&registry, "AAAA").is_err());
    }

    #[test]
    fn test_mixed_keys_rejected() {
        let registry = CryptoRegistry::new();
        let enc = registry
            .get(CryptoId::Ecdh256Ecdsa256)
            .generate_encryption_key_pair()
            .unwrap();
        let sig = registry
            .get(CryptoId::Ecdh521Ecdsa521)
            .generate_signing_key_pair()
            .unwrap();
        assert!(EmailDestination::new(enc.public, sig.public).is_err());
    }

    #[test]
    fn test_identity_serde_round_trip() {
        let registry = CryptoRegistry::new();
        let identity = EmailIdentity::generate(&registry, CryptoId::Ecdh256Ecdsa256, "bob").unwrap();
        let encoded = bincode::serialize(&identity).unwrap();
        let decoded: EmailIdentity = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, identity);
    }

    #[test]
    fn test_stateless_sign_does_not_persist() {
        let registry = CryptoRegistry::new();
        let mut identity =
            EmailIdentity::generate(&registry, CryptoId::Ecdh256Ecdsa256, "carol").unwrap();
        let signature = identity
            .sign(&registry, b"data", |_| -> std::result::Result<(), String> {
                panic!("nothing to persist")
            })
            .unwrap();
        assert!(EmailIdentity::verify(&registry, identity.destination(), b"data", &signature).unwrap());
    }

    #[test]
    fn test_stateful_sign_persists_before_returning() {
        let registry = CryptoRegistry::new();
        let mut identity =
            EmailIdentity::generate(&registry, CryptoId::Ntru1087Gmss512, "dave").unwrap();
        let before = identity.clone();
        let stored = RefCell::new(None);

        let signature = identity
            .sign(&registry, b"data", |next| -> std::result::Result<(), String> {
                *stored.borrow_mut() = Some(next.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(stored.borrow().as_ref(), Some(&identity));
        assert_ne!(identity, before);
        assert!(EmailIdentity::verify(&registry, identity.destination(), b"data", &signature).unwrap());
    }

    #[test]
    fn test_failed_persist_keeps_old_state() {
        let registry = CryptoRegistry::new();
        let mut identity =
            EmailIdentity::generate(&registry, CryptoId::Ntru1087Gmss512, "erin").unwrap();
        let before = identity.clone();

        let result = identity.sign(&registry, b"data", |_| Err("disk full"));
        assert!(matches!(result, Err(CryptoError::KeyPersistence(_))));
        assert_eq!(identity, before);
    }
}
