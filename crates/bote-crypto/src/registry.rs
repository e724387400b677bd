//! Crypto implementation registry
//!
//! Each hybrid algorithm implements [`CryptoImplementation`]. The
//! [`CryptoRegistry`] is built once at startup and handed to every component
//! that needs to encrypt, decrypt, sign or verify.

use std::sync::Arc;

use crate::ecc::{Ecdh256Ecdsa256, Ecdh521Ecdsa521};
use crate::elgamal::ElGamal2048Dsa1024;
use crate::error::{CryptoError, Result};
use crate::i2p_base64;
use crate::keys::{
    CryptoId, EncryptionKeyPair, EncryptionPrivateKey, EncryptionPublicKey, KeyLengths,
    Signature, SigningKeyPair, SigningPrivateKey, SigningPublicKey,
};
use crate::pq::Ntru1087Gmss512;
use crate::symmetric::MAX_PLAINTEXT_LEN;

/// A hybrid encryption and signature algorithm
pub trait CryptoImplementation: Send + Sync {
    /// Stable id of this implementation
    fn id(&self) -> CryptoId;

    /// Generate a key pair for encryption
    fn generate_encryption_key_pair(&self) -> Result<EncryptionKeyPair>;

    /// Generate a key pair for signing
    ///
    /// For the stateful scheme this builds a hash tree and can take a while.
    fn generate_signing_key_pair(&self) -> Result<SigningKeyPair>;

    /// Encrypt `data` for the holder of `public`
    fn encrypt(&self, data: &[u8], public: &EncryptionPublicKey) -> Result<Vec<u8>>;

    /// Decrypt data produced by [`CryptoImplementation::encrypt`]
    fn decrypt(
        &self,
        data: &[u8],
        public: &EncryptionPublicKey,
        private: &EncryptionPrivateKey,
    ) -> Result<Vec<u8>>;

    /// Sign `data`
    fn sign(&self, data: &[u8], private: &SigningPrivateKey) -> Result<Signature>;

    /// Check a signature. Malformed signatures verify as `false`.
    fn verify(&self, data: &[u8], signature: &[u8], public: &SigningPublicKey) -> Result<bool>;

    fn name(&self) -> &'static str {
        self.id().name()
    }

    fn key_lengths(&self) -> KeyLengths {
        self.id().key_lengths()
    }

    fn max_plaintext_len(&self) -> usize {
        MAX_PLAINTEXT_LEN
    }

    /// Base64 of both public keys, the form a destination is shared in
    fn public_keys_to_base64(
        &self,
        encryption: &EncryptionPublicKey,
        signing: &SigningPublicKey,
    ) -> Result<String> {
        encryption.ensure_id(self.id())?;
        signing.ensure_id(self.id())?;
        let mut bytes = encryption.as_bytes().to_vec();
        bytes.extend_from_slice(signing.as_bytes());
        Ok(i2p_base64::encode(&bytes))
    }

    /// Inverse of [`CryptoImplementation::public_keys_to_base64`]
    fn public_keys_from_base64(&self, s: &str) -> Result<(EncryptionPublicKey, SigningPublicKey)> {
        let bytes = i2p_base64::decode(s)?;
        let split = self.key_lengths().encryption_public;
        if bytes.len() < split {
            return Err(CryptoError::InvalidKey(format!(
                "destination too short for {}",
                self.name()
            )));
        }
        let encryption = EncryptionPublicKey::from_bytes(self.id(), &bytes[..split])?;
        let signing = SigningPublicKey::from_bytes(self.id(), &bytes[split..])?;
        Ok((encryption, signing))
    }
}

/// All crypto implementations, indexed by id
pub struct CryptoRegistry {
    implementations: Vec<Arc<dyn CryptoImplementation>>,
}

impl CryptoRegistry {
    /// Create a registry holding every supported implementation
    pub fn new() -> Self {
        let implementations: Vec<Arc<dyn CryptoImplementation>> = vec![
            Arc::new(ElGamal2048Dsa1024::new()),
            Arc::new(Ecdh256Ecdsa256),
            Arc::new(Ecdh521Ecdsa521),
            Arc::new(Ntru1087Gmss512::default()),
        ];
        CryptoRegistry { implementations }
    }

    /// Get the implementation for an id
    pub fn get(&self, id: CryptoId) -> &dyn CryptoImplementation {
        // Built in CryptoId order, ids start at 1
        self.implementations[(id.to_u8() - 1) as usize].as_ref()
    }

    /// Get the implementation for a raw wire byte
    pub fn get_by_u8(&self, id: u8) -> Result<&dyn CryptoImplementation> {
        Ok(self.get(CryptoId::from_u8(id)?))
    }

    /// Iterate over all implementations
    pub fn iter(&self) -> impl Iterator<Item = &dyn CryptoImplementation> {
        self.implementations.iter().map(|i| i.as_ref())
    }
}

impl Default for CryptoRegistry {
    fn default() -> Self {
        Self::new()
    }
}
