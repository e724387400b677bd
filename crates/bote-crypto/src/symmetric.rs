//! Symmetric half of the hybrid encryption schemes
//!
//! The asymmetric step of each implementation produces a shared secret. It is
//! expanded with HKDF-SHA256 (salted with the recipient's public key) into an
//! AES-256-GCM key; the asymmetric part of the ciphertext is bound in as
//! associated data.
//!
//! Layout: `asymmetric part || nonce (12) || AES-GCM output`

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Maximum plaintext accepted by any implementation
pub const MAX_PLAINTEXT_LEN: usize = 32 * 1024;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

const HKDF_INFO: &[u8] = b"bote hybrid encryption v1";

fn derive_cipher(secret: &[u8], recipient: &[u8]) -> Result<Aes256Gcm> {
    let hk = Hkdf::<Sha256>::new(Some(recipient), secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(HKDF_INFO, &mut key[..])
        .map_err(|_| CryptoError::EncryptionFailed("key derivation".to_string()))?;
    Aes256Gcm::new_from_slice(&key[..])
        .map_err(|_| CryptoError::EncryptionFailed("cipher init".to_string()))
}

/// Check a plaintext against [`MAX_PLAINTEXT_LEN`]
pub fn check_plaintext_len(data: &[u8]) -> Result<()> {
    if data.len() > MAX_PLAINTEXT_LEN {
        return Err(CryptoError::PlaintextTooLarge {
            size: data.len(),
            max: MAX_PLAINTEXT_LEN,
        });
    }
    Ok(())
}

/// Encrypt `plaintext` and append nonce and ciphertext to `asymmetric`
pub fn seal(
    secret: &[u8],
    recipient: &[u8],
    mut asymmetric: Vec<u8>,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    check_plaintext_len(plaintext)?;
    let cipher = derive_cipher(secret, recipient)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &asymmetric,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed("AEAD seal".to_string()))?;

    asymmetric.reserve(NONCE_LEN + ciphertext.len());
    asymmetric.extend_from_slice(&nonce);
    asymmetric.extend_from_slice(&ciphertext);
    Ok(asymmetric)
}

/// Decrypt the part of `data` following the `asymmetric_len` byte prefix
pub fn open(secret: &[u8], recipient: &[u8], data: &[u8], asymmetric_len: usize) -> Result<Vec<u8>> {
    if data.len() < asymmetric_len + NONCE_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (asymmetric, rest) = data.split_at(asymmetric_len);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = derive_cipher(secret, recipient).map_err(|_| CryptoError::DecryptionFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: asymmetric,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}
