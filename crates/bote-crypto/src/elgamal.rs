//! ElGamal-2048 encryption with DSA-1024 signatures
//!
//! ElGamal works in the RFC 3526 2048-bit MODP group with generator 2. The
//! ElGamal step transports a random group element `m`; `m` is the secret the
//! symmetric layer derives its key from.
//!
//! Ciphertext: `a (256) || b (256) || nonce || AES-GCM output`
//! where `a = g^k` and `b = m * y^k`.

use dsa::signature::{Signer, Verifier};
use dsa::{BigUint, Components, SigningKey, VerifyingKey};
use num_bigint_dig::RandBigInt;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use crate::keys::{
    pad_to, CryptoId, EncryptionKeyPair, EncryptionPrivateKey, EncryptionPublicKey, Signature,
    SigningKeyPair, SigningPrivateKey, SigningPublicKey,
};
use crate::registry::CryptoImplementation;
use crate::symmetric;

/// RFC 3526 2048-bit MODP group prime
const ELGAMAL_P: &str = "\
FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74020BBEA63B139B22514A08798E3404DD\
EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
83655D23DCA3AD961C62F356208552BB9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF6955817183995497CEA956AE515D2261898FA0510\
15728E5A8AACAA68FFFFFFFFFFFFFFFF";

const ELGAMAL_G: u32 = 2;

/// DSA-1024 domain parameters (q is 160 bits, q divides p - 1)
const DSA_P: &str = "\
dbafd5d6e221a4a7b3556a5a4f6d35d626bb595cf825d4aef2c473f18df150552baa046e77eb27241076cc79646886fc\
6d2dfeef1aadefe8e446558b6a556240a343cee80811839f261f7ca0d0680e743d08069afe14ca7e347d598701246ee8\
3d1a7902e9e6b66d7319f0ff2b0cfb6cec8988c81c09652c848da5525fa4adf3";

const DSA_Q: &str = "fc1b6d55d10ce4f195e734852229b99603eaa653";

const DSA_G: &str = "\
7ceff8f0f0f2e1de64f3e4eddafd4e3c77d9dbf69ccbdf25b16a8662af621e79f61a320f294248550670fd6e8e1a39ce\
12c7e1ac511087d6f7a2635f786ed56885e573a92d174486961c65ca89890d45e6b487b63220edea64da367dca43b8b3\
69b97b760204f45e073e2e3f6dc666b166c14601294e32e024efa1350f60c771";

const ELGAMAL_LEN: usize = 256;
const DSA_Y_LEN: usize = 128;
const DSA_X_LEN: usize = 20;

fn parse_constant(hex: &str) -> BigUint {
    BigUint::parse_bytes(hex.as_bytes(), 16).expect("group constants are valid hex")
}

/// ElGamal-2048 / DSA-1024, crypto id 1
pub struct ElGamal2048Dsa1024 {
    p: BigUint,
    g: BigUint,
    dsa: Components,
}

impl ElGamal2048Dsa1024 {
    /// Create the implementation with its fixed group parameters
    pub fn new() -> Self {
        let dsa = Components::from_components(
            parse_constant(DSA_P),
            parse_constant(DSA_Q),
            parse_constant(DSA_G),
        )
        .expect("DSA domain parameters are valid");

        ElGamal2048Dsa1024 {
            p: parse_constant(ELGAMAL_P),
            g: BigUint::from(ELGAMAL_G),
            dsa,
        }
    }

    fn random_exponent(&self) -> BigUint {
        let two = BigUint::from(2u32);
        let upper = &self.p - &BigUint::from(1u32);
        OsRng.gen_biguint_range(&two, &upper)
    }

    fn encryption_public(&self, key: &EncryptionPublicKey) -> Result<BigUint> {
        key.ensure_id(self.id())?;
        let y = BigUint::from_bytes_be(key.as_bytes());
        let upper = &self.p - &BigUint::from(1u32);
        if y <= BigUint::from(1u32) || y >= upper {
            return Err(CryptoError::InvalidKey(
                "ElGamal public key outside the group".to_string(),
            ));
        }
        Ok(y)
    }

    fn verifying_key(&self, key: &SigningPublicKey) -> Result<VerifyingKey> {
        key.ensure_id(self.id())?;
        VerifyingKey::from_components(self.dsa.clone(), BigUint::from_bytes_be(key.as_bytes()))
            .map_err(|_| CryptoError::InvalidKey("DSA public key rejected".to_string()))
    }

    fn signing_key(&self, key: &SigningPrivateKey) -> Result<SigningKey> {
        key.ensure_id(self.id())?;
        let x = BigUint::from_bytes_be(key.as_bytes());
        let y = self.dsa.g().modpow(&x, self.dsa.p());
        let verifying = VerifyingKey::from_components(self.dsa.clone(), y)
            .map_err(|_| CryptoError::InvalidKey("DSA private key rejected".to_string()))?;
        SigningKey::from_components(verifying, x)
            .map_err(|_| CryptoError::InvalidKey("DSA private key rejected".to_string()))
    }
}

impl Default for ElGamal2048Dsa1024 {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoImplementation for ElGamal2048Dsa1024 {
    fn id(&self) -> CryptoId {
        CryptoId::ElGamal2048Dsa1024
    }

    fn generate_encryption_key_pair(&self) -> Result<EncryptionKeyPair> {
        let x = self.random_exponent();
        let y = self.g.modpow(&x, &self.p);

        let x_bytes = Zeroizing::new(pad_to(&x.to_bytes_be(), ELGAMAL_LEN, "ElGamal x")?);
        Ok(EncryptionKeyPair {
            public: EncryptionPublicKey::from_bytes(
                self.id(),
                &pad_to(&y.to_bytes_be(), ELGAMAL_LEN, "ElGamal y")?,
            )?,
            private: EncryptionPrivateKey::from_bytes(self.id(), &x_bytes)?,
        })
    }

    fn generate_signing_key_pair(&self) -> Result<SigningKeyPair> {
        let key = SigningKey::generate(&mut OsRng, self.dsa.clone());
        let y = key.verifying_key().y().to_bytes_be();
        let x = Zeroizing::new(pad_to(&key.x().to_bytes_be(), DSA_X_LEN, "DSA x")?);

        Ok(SigningKeyPair {
            public: SigningPublicKey::from_bytes(self.id(), &pad_to(&y, DSA_Y_LEN, "DSA y")?)?,
            private: SigningPrivateKey::from_bytes(self.id(), &x)?,
        })
    }

    fn encrypt(&self, data: &[u8], public: &EncryptionPublicKey) -> Result<Vec<u8>> {
        symmetric::check_plaintext_len(data)?;
        let y = self.encryption_public(public)?;

        let m = self.random_exponent();
        let k = self.random_exponent();
        let a = self.g.modpow(&k, &self.p);
        let b = (&m * y.modpow(&k, &self.p)) % &self.p;

        let secret = Zeroizing::new(pad_to(&m.to_bytes_be(), ELGAMAL_LEN, "ElGamal m")?);
        let mut asymmetric = pad_to(&a.to_bytes_be(), ELGAMAL_LEN, "ElGamal a")?;
        asymmetric.extend_from_slice(&pad_to(&b.to_bytes_be(), ELGAMAL_LEN, "ElGamal b")?);

        symmetric::seal(&secret, public.as_bytes(), asymmetric, data)
    }

    fn decrypt(
        &self,
        data: &[u8],
        public: &EncryptionPublicKey,
        private: &EncryptionPrivateKey,
    ) -> Result<Vec<u8>> {
        public.ensure_id(self.id())?;
        private.ensure_id(self.id())?;
        if data.len() < 2 * ELGAMAL_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let a = BigUint::from_bytes_be(&data[..ELGAMAL_LEN]);
        let b = BigUint::from_bytes_be(&data[ELGAMAL_LEN..2 * ELGAMAL_LEN]);
        let zero = BigUint::default();
        if a == zero || b == zero || a >= self.p || b >= self.p {
            return Err(CryptoError::DecryptionFailed);
        }

        // a^(p-1-x) = a^-x
        let x = BigUint::from_bytes_be(private.as_bytes());
        let upper = &self.p - &BigUint::from(1u32);
        if x >= upper {
            return Err(CryptoError::InvalidKey("ElGamal private key out of range".to_string()));
        }
        let exponent = &upper - &x;
        let m = (&b * a.modpow(&exponent, &self.p)) % &self.p;

        let secret = Zeroizing::new(pad_to(&m.to_bytes_be(), ELGAMAL_LEN, "ElGamal m")?);
        symmetric::open(&secret, public.as_bytes(), data, 2 * ELGAMAL_LEN)
    }

    fn sign(&self, data: &[u8], private: &SigningPrivateKey) -> Result<Signature> {
        let key = self.signing_key(private)?;
        let signature: dsa::Signature = key
            .try_sign(data)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = pad_to(&signature.r().to_bytes_be(), DSA_X_LEN, "DSA r")?;
        bytes.extend_from_slice(&pad_to(&signature.s().to_bytes_be(), DSA_X_LEN, "DSA s")?);

        Ok(Signature {
            bytes,
            updated_key: None,
        })
    }

    fn verify(&self, data: &[u8], signature: &[u8], public: &SigningPublicKey) -> Result<bool> {
        let key = self.verifying_key(public)?;
        if signature.len() != 2 * DSA_X_LEN {
            return Ok(false);
        }

        let r = BigUint::from_bytes_be(&signature[..DSA_X_LEN]);
        let s = BigUint::from_bytes_be(&signature[DSA_X_LEN..]);
        let signature = match dsa::Signature::from_components(r, s) {
            Ok(signature) => signature,
            Err(_) => return Ok(false),
        };

        Ok(key.verify(data, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters() {
        let imp = ElGamal2048Dsa1024::new();
        assert_eq!(imp.p.bits(), 2048);
        assert_eq!(imp.dsa.p().bits(), 1024);
        assert_eq!(imp.dsa.q().bits(), 160);
        assert_eq!(
            imp.dsa.g().modpow(imp.dsa.q(), imp.dsa.p()),
            BigUint::from(1u32)
        );
    }

    #[test]
    fn test_key_lengths() {
        let imp = ElGamal2048Dsa1024::new();
        let enc = imp.generate_encryption_key_pair().unwrap();
        let sig = imp.generate_signing_key_pair().unwrap();
        assert_eq!(enc.public.as_bytes().len(), 256);
        assert_eq!(enc.private.as_bytes().len(), 256);
        assert_eq!(sig.public.as_bytes().len(), 128);
        assert_eq!(sig.private.as_bytes().len(), 20);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let imp = ElGamal2048Dsa1024::new();
        let keys = imp.generate_encryption_key_pair().unwrap();

        for size in [0usize, 1, 1000, symmetric::MAX_PLAINTEXT_LEN] {
            let message = vec![0x5A; size];
            let ciphertext = imp.encrypt(&message, &keys.public).unwrap();
            let plaintext = imp.decrypt(&ciphertext, &keys.public, &keys.private).unwrap();
            assert_eq!(plaintext, message);
        }
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let imp = ElGamal2048Dsa1024::new();
        let alice = imp.generate_encryption_key_pair().unwrap();
        let bob = imp.generate_encryption_key_pair().unwrap();

        let ciphertext = imp.encrypt(b"for alice", &alice.public).unwrap();
        assert_eq!(
            imp.decrypt(&ciphertext, &bob.public, &bob.private),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_sign_verify() {
        let imp = ElGamal2048Dsa1024::new();
        let keys = imp.generate_signing_key_pair().unwrap();

        let signature = imp.sign(b"message", &keys.private).unwrap();
        assert_eq!(signature.bytes.len(), 40);
        assert!(signature.updated_key.is_none());
        assert!(imp.verify(b"message", &signature.bytes, &keys.public).unwrap());
        assert!(!imp.verify(b"messagf", &signature.bytes, &keys.public).unwrap());

        let mut flipped = signature.bytes.clone();
        flipped[39] ^= 0x01;
        assert!(!imp.verify(b"message", &flipped, &keys.public).unwrap());
    }
}
