//! Base64 with the I2P alphabet
//!
//! Identical to standard base64 except that `+` and `/` are replaced by `-`
//! and `~`, which keeps destinations safe in file names and URLs.

use ::base64::alphabet::Alphabet;
use ::base64::engine::general_purpose::{GeneralPurpose, PAD};
use ::base64::Engine;

use crate::error::{CryptoError, Result};

const I2P_ALPHABET: Alphabet =
    match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-~") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid I2P base64 alphabet"),
    };

/// Engine for the I2P base64 alphabet, padded with `=`
pub const I2P: GeneralPurpose = GeneralPurpose::new(&I2P_ALPHABET, PAD);

/// Encode bytes as I2P base64
pub fn encode(bytes: &[u8]) -> String {
    I2P.encode(bytes)
}

/// Decode an I2P base64 string
pub fn decode(s: &str) -> Result<Vec<u8>> {
    I2P.decode(s.trim())
        .map_err(|e| CryptoError::InvalidBase64(e.to_string()))
}

/// Length of the base64 encoding of `len` bytes
pub fn encoded_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_i2p_characters() {
        // 0xfb 0xff encodes to characters 62 and 63 of the alphabet
        let encoded = encode(&[0xfb, 0xff, 0xbf]);
        assert_eq!(encoded, "-~-~");
        assert_eq!(decode(&encoded).unwrap(), vec![0xfb, 0xff, 0xbf]);
    }

    #[test]
    fn test_padding() {
        assert_eq!(encode(b"a"), "YQ==");
        assert_eq!(decode("YQ==").unwrap(), b"a");
    }

    #[test]
    fn test_rejects_standard_alphabet() {
        assert!(matches!(decode("+/+/"), Err(CryptoError::InvalidBase64(_))));
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(encoded_len(0), 0);
        assert_eq!(encoded_len(1), 4);
        assert_eq!(encoded_len(66), 88);
        assert_eq!(encoded_len(1601), 2136);
        assert_eq!(encode(&[0u8; 1601]).len(), 2136);
    }
}
