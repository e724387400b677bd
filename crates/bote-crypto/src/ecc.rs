//! Elliptic curve implementations: ECDH/ECDSA over P-256 and P-521
//!
//! Public keys are stored point-compressed. A compressed P-521 point is a tag
//! byte plus a 66-byte x coordinate; since x < 2^521 the top seven bits of the
//! first x byte are always zero, so the y parity is folded into bit 1 of that
//! byte and the tag is dropped, giving 66 bytes instead of 67.
//!
//! Ciphertext: `ephemeral public key || nonce || AES-GCM output`

use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use crate::error::{CryptoError, Result};
use crate::keys::{
    CryptoId, EncryptionKeyPair, EncryptionPrivateKey, EncryptionPublicKey, Signature,
    SigningKeyPair, SigningPrivateKey, SigningPublicKey,
};
use crate::registry::CryptoImplementation;
use crate::symmetric;

const P256_POINT_LEN: usize = 33;
const P521_POINT_LEN: usize = 66;

fn invalid_key(what: &str) -> CryptoError {
    CryptoError::InvalidKey(format!("{} rejected", what))
}

/// Fold a 67-byte compressed P-521 point into 66 bytes
fn fold_p521_point(compressed: &[u8]) -> Result<Vec<u8>> {
    if compressed.len() != P521_POINT_LEN + 1 || compressed[1] & 0xFE != 0 {
        return Err(invalid_key("P-521 point"));
    }
    let mut folded = compressed[1..].to_vec();
    folded[0] |= (compressed[0] & 0x01) << 1;
    Ok(folded)
}

/// Restore the 67-byte SEC1 compressed form of a folded P-521 point
fn unfold_p521_point(folded: &[u8]) -> Result<Vec<u8>> {
    if folded.len() != P521_POINT_LEN || folded[0] & 0xFC != 0 {
        return Err(invalid_key("P-521 point"));
    }
    let mut compressed = Vec::with_capacity(P521_POINT_LEN + 1);
    compressed.push(0x02 | ((folded[0] >> 1) & 0x01));
    compressed.extend_from_slice(folded);
    compressed[1] &= 0x01;
    Ok(compressed)
}

/// ECDH-256 / ECDSA-256, crypto id 2
pub struct Ecdh256Ecdsa256;

impl CryptoImplementation for Ecdh256Ecdsa256 {
    fn id(&self) -> CryptoId {
        CryptoId::Ecdh256Ecdsa256
    }

    fn generate_encryption_key_pair(&self) -> Result<EncryptionKeyPair> {
        let secret = p256::SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(true);

        Ok(EncryptionKeyPair {
            public: EncryptionPublicKey::from_bytes(self.id(), public.as_bytes())?,
            private: EncryptionPrivateKey::from_bytes(self.id(), &secret.to_bytes())?,
        })
    }

    fn generate_signing_key_pair(&self) -> Result<SigningKeyPair> {
        let key = p256::ecdsa::SigningKey::random(&mut OsRng);
        let public = key.verifying_key().to_encoded_point(true);

        Ok(SigningKeyPair {
            public: SigningPublicKey::from_bytes(self.id(), public.as_bytes())?,
            private: SigningPrivateKey::from_bytes(self.id(), &key.to_bytes())?,
        })
    }

    fn encrypt(&self, data: &[u8], public: &EncryptionPublicKey) -> Result<Vec<u8>> {
        public.ensure_id(self.id())?;
        symmetric::check_plaintext_len(data)?;
        let recipient = p256::PublicKey::from_sec1_bytes(public.as_bytes())
            .map_err(|_| invalid_key("P-256 public key"))?;

        let ephemeral = p256::ecdh::EphemeralSecret::random(&mut OsRng);
        let shared = ephemeral.diffie_hellman(&recipient);
        let ephemeral_public = ephemeral.public_key().to_encoded_point(true);

        symmetric::seal(
            shared.raw_secret_bytes().as_slice(),
            public.as_bytes(),
            ephemeral_public.as_bytes().to_vec(),
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
        if data.len() < P256_POINT_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let secret = p256::SecretKey::from_slice(private.as_bytes())
            .map_err(|_| invalid_key("P-256 private key"))?;
        let ephemeral = p256::PublicKey::from_sec1_bytes(&data[..P256_POINT_LEN])
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());

        symmetric::open(
            shared.raw_secret_bytes().as_slice(),
            public.as_bytes(),
            data,
            P256_POINT_LEN,
        )
    }

    fn sign(&self, data: &[u8], private: &SigningPrivateKey) -> Result<Signature> {
        use p256::ecdsa::signature::Signer;

        private.ensure_id(self.id())?;
        let key = p256::ecdsa::SigningKey::from_slice(private.as_bytes())
            .map_err(|_| invalid_key("P-256 signing key"))?;
        let signature: p256::ecdsa::Signature = key
            .try_sign(data)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        Ok(Signature {
            bytes: signature.to_bytes().to_vec(),
            updated_key: None,
        })
    }

    fn verify(&self, data: &[u8], signature: &[u8], public: &SigningPublicKey) -> Result<bool> {
        use p256::ecdsa::signature::Verifier;

        public.ensure_id(self.id())?;
        let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public.as_bytes())
            .map_err(|_| invalid_key("P-256 verifying key"))?;
        let signature = match p256::ecdsa::Signature::from_slice(signature) {
            Ok(signature) => signature,
            Err(_) => return Ok(false),
        };

        Ok(key.verify(data, &signature).is_ok())
    }
}

/// ECDH-521 / ECDSA-521, crypto id 3
pub struct Ecdh521Ecdsa521;

impl CryptoImplementation for Ecdh521Ecdsa521 {
    fn id(&self) -> CryptoId {
        CryptoId::Ecdh521Ecdsa521
    }

    fn generate_encryption_key_pair(&self) -> Result<EncryptionKeyPair> {
        let secret = p521::SecretKey::random(&mut OsRng);
        let public = fold_p521_point(secret.public_key().to_encoded_point(true).as_bytes())?;

        Ok(EncryptionKeyPair {
            public: EncryptionPublicKey::from_bytes(self.id(), &public)?,
            private: EncryptionPrivateKey::from_bytes(self.id(), &secret.to_bytes())?,
        })
    }

    fn generate_signing_key_pair(&self) -> Result<SigningKeyPair> {
        let key = p521::ecdsa::SigningKey::random(&mut OsRng);
        let public = fold_p521_point(p521::ecdsa::VerifyingKey::from(&key).to_encoded_point(true).as_bytes())?;

        Ok(SigningKeyPair {
            public: SigningPublicKey::from_bytes(self.id(), &public)?,
            private: SigningPrivateKey::from_bytes(self.id(), &key.to_bytes())?,
        })
    }

    fn encrypt(&self, data: &[u8], public: &EncryptionPublicKey) -> Result<Vec<u8>> {
        public.ensure_id(self.id())?;
        symmetric::check_plaintext_len(data)?;
        let recipient = p521::PublicKey::from_sec1_bytes(&unfold_p521_point(public.as_bytes())?)
            .map_err(|_| invalid_key("P-521 public key"))?;

        let ephemeral = p521::ecdh::EphemeralSecret::random(&mut OsRng);
        let shared = ephemeral.diffie_hellman(&recipient);
        let ephemeral_public =
            fold_p521_point(ephemeral.public_key().to_encoded_point(true).as_bytes())?;

        symmetric::seal(
            shared.raw_secret_bytes().as_slice(),
            public.as_bytes(),
            ephemeral_public,
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
        if data.len() < P521_POINT_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let secret = p521::SecretKey::from_slice(private.as_bytes())
            .map_err(|_| invalid_key("P-521 private key"))?;
        let compressed =
            unfold_p521_point(&data[..P521_POINT_LEN]).map_err(|_| CryptoError::DecryptionFailed)?;
        let ephemeral =
            p521::PublicKey::from_sec1_bytes(&compressed).map_err(|_| CryptoError::DecryptionFailed)?;
        let shared = p521::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());

        symmetric::open(
            shared.raw_secret_bytes().as_slice(),
            public.as_bytes(),
            data,
            P521_POINT_LEN,
        )
    }

    fn sign(&self, data: &[u8], private: &SigningPrivateKey) -> Result<Signature> {
        use p521::ecdsa::signature::Signer;

        private.ensure_id(self.id())?;
        let key = p521::ecdsa::SigningKey::from_slice(private.as_bytes())
            .map_err(|_| invalid_key("P-521 signing key"))?;
        let signature: p521::ecdsa::Signature = key
            .try_sign(data)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        Ok(Signature {
            bytes: signature.to_bytes().to_vec(),
            updated_key: None,
        })
    }

    fn verify(&self, data: &[u8], signature: &[u8], public: &SigningPublicKey) -> Result<bool> {
        use p521::ecdsa::signature::Verifier;

        public.ensure_id(self.id())?;
        let key = p521::ecdsa::VerifyingKey::from_sec1_bytes(&unfold_p521_point(public.as_bytes())?)
            .map_err(|_| invalid_key("P-521 verifying key"))?;
        let signature = match p521::ecdsa::Signature::from_slice(signature) {
            Ok(signature) => signature,
            Err(_) => return Ok(false),
        };

        Ok(key.verify(data, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(imp: &dyn CryptoImplementation) {
        let keys = imp.generate_encryption_key_pair().unwrap();
        for size in [0usize, 1, 4096, symmetric::MAX_PLAINTEXT_LEN] {
            let message: Vec<u8> = (0..size).map(|i| i as u8).collect();
            let ciphertext = imp.encrypt(&message, &keys.public).unwrap();
            assert_eq!(
                imp.decrypt(&ciphertext, &keys.public, &keys.private).unwrap(),
                message
            );
        }
    }

    fn sign_and_flip(imp: &dyn CryptoImplementation) {
        let keys = imp.generate_signing_key_pair().unwrap();
        let signature = imp.sign(b"hello bote", &keys.private).unwrap();
        assert_eq!(signature.bytes.len(), imp.key_lengths().signature);
        assert!(imp.verify(b"hello bote", &signature.bytes, &keys.public).unwrap());

        for bit in [0usize, 7, signature.bytes.len() * 8 - 1] {
            let mut flipped = signature.bytes.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert!(!imp.verify(b"hello bote", &flipped, &keys.public).unwrap());
        }
        assert!(!imp.verify(b"hello botf", &signature.bytes, &keys.public).unwrap());
    }

    #[test]
    fn test_p256_encrypt_decrypt() {
        round_trip(&Ecdh256Ecdsa256);
    }

    #[test]
    fn test_p521_encrypt_decrypt() {
        round_trip(&Ecdh521Ecdsa521);
    }

    #[test]
    fn test_p256_sign_verify() {
        sign_and_flip(&Ecdh256Ecdsa256);
    }

    #[test]
    fn test_p521_sign_verify() {
        sign_and_flip(&Ecdh521Ecdsa521);
    }

    #[test]
    fn test_p521_keys_are_66_bytes() {
        for _ in 0..8 {
            let enc = Ecdh521Ecdsa521.generate_encryption_key_pair().unwrap();
            let sig = Ecdh521Ecdsa521.generate_signing_key_pair().unwrap();
            assert_eq!(enc.public.as_bytes().len(), 66);
            assert_eq!(enc.private.as_bytes().len(), 66);
            assert_eq!(sig.public.as_bytes().len(), 66);
        }
    }

    #[test]
    fn test_p521_fold_round_trip() {
        let secret = p521::SecretKey::random(&mut OsRng);
        let compressed = secret.public_key().to_encoded_point(true);
        let folded = fold_p521_point(compressed.as_bytes()).unwrap();
        assert_eq!(unfold_p521_point(&folded).unwrap(), compressed.as_bytes());
    }

    #[test]
    fn test_p521_fold_rejects_high_bits() {
        let mut folded = vec![0u8; 66];
        folded[0] = 0x04;
        assert!(unfold_p521_point(&folded).is_err());
    }

    #[test]
    fn test_wrong_implementation_key_rejected() {
        let keys = Ecdh256Ecdsa256.generate_encryption_key_pair().unwrap();
        assert!(matches!(
            Ecdh521Ecdsa521.encrypt(b"x", &keys.public),
            Err(CryptoError::CryptoIdMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_corrupt_ciphertext() {
        let keys = Ecdh256Ecdsa256.generate_encryption_key_pair().unwrap();
        let mut ciphertext = Ecdh256Ecdsa256.encrypt(b"payload", &keys.public).unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert_eq!(
            Ecdh256Ecdsa256.decrypt(&ciphertext, &keys.public, &keys.private),
            Err(CryptoError::DecryptionFailed)
        );
    }
}
