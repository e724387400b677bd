//! Post-quantum hybrid implementation, crypto id 4
//!
//! Encryption wraps a fresh symmetric key with a lattice KEM (ML-KEM-1024);
//! signatures use the stateful hash-based scheme in [`crate::gmss`].
//!
//! Ciphertext: `KEM ciphertext (1568) || nonce || AES-GCM output`

use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem1024};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::error::{CryptoError, Result};
use crate::gmss::{self, GmssPrivateKey, GmssPublicKey};
use crate::keys::{
    CryptoId, EncryptionKeyPair, EncryptionPrivateKey, EncryptionPublicKey, Signature,
    SigningKeyPair, SigningPrivateKey, SigningPublicKey,
};
use crate::registry::CryptoImplementation;
use crate::symmetric;

type DecapsulationKey = <MlKem1024 as KemCore>::DecapsulationKey;
type EncapsulationKey = <MlKem1024 as KemCore>::EncapsulationKey;

const KEM_CIPHERTEXT_LEN: usize = 1568;

/// Lattice KEM plus stateful hash-based signatures
pub struct Ntru1087Gmss512 {
    tree_height: u8,
}

impl Ntru1087Gmss512 {
    /// Create with a custom tree height per layer (`2^(2h)` signatures per key)
    pub fn with_tree_height(tree_height: u8) -> Self {
        Ntru1087Gmss512 { tree_height }
    }
}

impl Default for Ntru1087Gmss512 {
    fn default() -> Self {
        Self::with_tree_height(gmss::DEFAULT_HEIGHT)
    }
}

impl CryptoImplementation for Ntru1087Gmss512 {
    fn id(&self) -> CryptoId {
        CryptoId::Ntru1087Gmss512
    }

    fn generate_encryption_key_pair(&self) -> Result<EncryptionKeyPair> {
        let (dk, ek) = MlKem1024::generate(&mut OsRng);
        Ok(EncryptionKeyPair {
            public: EncryptionPublicKey::from_bytes(self.id(), ek.as_bytes().as_slice())?,
            private: EncryptionPrivateKey::from_bytes(self.id(), dk.as_bytes().as_slice())?,
        })
    }

    fn generate_signing_key_pair(&self) -> Result<SigningKeyPair> {
        let mut seed = [0u8; gmss::N];
        OsRng.fill_bytes(&mut seed);

        debug!("building signing tree of height {}", self.tree_height);
        let (private, public) = gmss::generate(seed, self.tree_height)?;
        Ok(SigningKeyPair {
            public: SigningPublicKey::from_bytes(self.id(), &public.to_bytes())?,
            private: SigningPrivateKey::from_bytes(self.id(), &private.to_bytes())?,
        })
    }

    fn encrypt(&self, data: &[u8], public: &EncryptionPublicKey) -> Result<Vec<u8>> {
        public.ensure_id(self.id())?;
        symmetric::check_plaintext_len(data)?;

        let ek = EncapsulationKey::from_bytes(
            &public
                .as_bytes()
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("ML-KEM public key".to_string()))?,
        );
        let (ciphertext, shared) = ek
            .encapsulate(&mut OsRng)
            .map_err(|_| CryptoError::EncryptionFailed("encapsulation".to_string()))?;

        symmetric::seal(
            shared.as_slice(),
            public.as_bytes(),
            ciphertext.as_slice().to_vec(),
            data,
        )
    }

    fn decrypt(
        &self,
        data: &[u8],
        public: &EncryptionPublicKey,
        private: &EncryptionPrivateKey,
    ) -> Result<Vec<u8>> {
        public.ensure_id(self.id())?;
        private.ensure_id(self.id())?;
        if data.len() < KEM_CIPHERTEXT_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let dk = DecapsulationKey::from_bytes(
            &private
                .as_bytes()
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("ML-KEM private key".to_string()))?,
        );
        let ciphertext: Ciphertext<MlKem1024> = data[..KEM_CIPHERTEXT_LEN]
            .try_into()
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let shared = dk
            .decapsulate(&ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        symmetric::open(shared.as_slice(), public.as_bytes(), data, KEM_CIPHERTEXT_LEN)
    }

    fn sign(&self, data: &[u8], private: &SigningPrivateKey) -> Result<Signature> {
        private.ensure_id(self.id())?;
        let key = GmssPrivateKey::from_bytes(private.as_bytes())?;
        let (bytes, next) = gmss::sign(&key, data)?;

        if next.remaining() == 0 {
            debug!("signing key used its last signature");
        }

        Ok(Signature {
            bytes,
            updated_key: Some(SigningPrivateKey::from_bytes(self.id(), &next.to_bytes())?),
        })
    }

    fn verify(&self, data: &[u8], signature: &[u8], public: &SigningPublicKey) -> Result<bool> {
        public.ensure_id(self.id())?;
        let key = GmssPublicKey::from_bytes(public.as_bytes())?;
        Ok(gmss::verify(&key, data, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lengths() {
        let imp = Ntru1087Gmss512::with_tree_height(2);
        let enc = imp.generate_encryption_key_pair().unwrap();
        let sig = imp.generate_signing_key_pair().unwrap();
        assert_eq!(enc.public.as_bytes().len(), 1568);
        assert_eq!(enc.private.as_bytes().len(), 3168);
        assert_eq!(sig.public.as_bytes().len(), 33);
        assert_eq!(sig.private.as_bytes().len(), 37);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let imp = Ntru1087Gmss512::default();
        let keys = imp.generate_encryption_key_pair().unwrap();
        for size in [0usize, 17, symmetric::MAX_PLAINTEXT_LEN] {
            let message = vec![0xC3; size];
            let ciphertext = imp.encrypt(&message, &keys.public).unwrap();
            assert_eq!(
                imp.decrypt(&ciphertext, &keys.public, &keys.private).unwrap(),
                message
            );
        }
    }

    #[test]
    fn test_decrypt_with_other_key_fails() {
        let imp = Ntru1087Gmss512::default();
        let alice = imp.generate_encryption_key_pair().unwrap();
        let bob = imp.generate_encryption_key_pair().unwrap();
        let ciphertext = imp.encrypt(b"secret", &alice.public).unwrap();
        assert_eq!(
            imp.decrypt(&ciphertext, &bob.public, &bob.private),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_sign_returns_updated_key() {
        let imp = Ntru1087Gmss512::with_tree_height(2);
        let keys = imp.generate_signing_key_pair().unwrap();

        let first = imp.sign(b"one", &keys.private).unwrap();
        let updated = first.updated_key.clone().unwrap();
        assert_ne!(updated, keys.private);
        assert!(imp.verify(b"one", &first.bytes, &keys.public).unwrap());

        let second = imp.sign(b"two", &updated).unwrap();
        assert!(imp.verify(b"two", &second.bytes, &keys.public).unwrap());
        assert_ne!(first.bytes[..4], second.bytes[..4]);
    }

    #[test]
    fn test_exhaustion() {
        let imp = Ntru1087Gmss512::with_tree_height(1);
        let keys = imp.generate_signing_key_pair().unwrap();
        let mut key = keys.private;
        for _ in 0..4 {
            key = imp.sign(b"m", &key).unwrap().updated_key.unwrap();
        }
        assert!(matches!(imp.sign(b"m", &key), Err(CryptoError::KeyExhausted(4))));
    }
}
