//! Bote cryptography
//!
//! Pluggable hybrid encryption and signature implementations selected by a
//! one-byte [`CryptoId`]:
//!
//! | id | encryption    | signatures            |
//! |----|---------------|-----------------------|
//! | 1  | ElGamal-2048  | DSA-1024              |
//! | 2  | ECDH P-256    | ECDSA P-256           |
//! | 3  | ECDH P-521    | ECDSA P-521           |
//! | 4  | ML-KEM-1024   | two-layer Merkle/WOTS |
//!
//! Build one [`CryptoRegistry`] at startup and pass it to whatever needs it.

pub mod ecc;
pub mod elgamal;
pub mod error;
pub mod gmss;
pub mod i2p_base64;
pub mod identity;
pub mod keys;
pub mod pq;
pub mod registry;
pub mod symmetric;

pub use error::{CryptoError, Result};
pub use identity::{EmailDestination, EmailIdentity};
pub use keys::{
    CryptoId, EncryptionKeyPair, EncryptionPrivateKey, EncryptionPublicKey, KeyLengths,
    Signature, SigningKeyPair, SigningPrivateKey, SigningPublicKey,
};
pub use registry::{CryptoImplementation, CryptoRegistry};
pub use symmetric::MAX_PLAINTEXT_LEN;
