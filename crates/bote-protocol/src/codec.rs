//! Binary packet codec
//!
//! Every packet starts with a two byte header:
//! - Version (1 byte): [`PROTOCOL_VERSION`]
//! - Type (1 byte): ASCII type code, see [`PacketType`]
//!
//! Fields follow in a fixed order. Integers are big-endian and variable-length
//! fields carry a u16 length prefix. Readers never index past the end of the
//! input; running out of bytes is a [`ProtocolError::Truncated`] error.

use crate::error::{ProtocolError, Result};
use crate::packet::PacketType;
use crate::types::{Hash, UniqueId, HASH_SIZE, UNIQUE_ID_SIZE};

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 4;

/// Header size: version + type code
pub const HEADER_SIZE: usize = 2;

/// Maximum size of a packet sent as a single datagram
pub const MAX_DATAGRAM_SIZE: usize = 31 * 1024;

/// Serializes packet fields after the header
pub struct PacketWriter {
    bytes: Vec<u8>,
}

impl PacketWriter {
    /// Start a packet of the given type
    pub fn new(packet_type: PacketType) -> Self {
        let mut bytes = Vec::with_capacity(64);
        bytes.push(PROTOCOL_VERSION);
        bytes.push(packet_type.to_u8());
        PacketWriter { bytes }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_hash(&mut self, hash: &Hash) {
        self.bytes.extend_from_slice(hash.as_bytes());
    }

    pub fn put_id(&mut self, id: &UniqueId) {
        self.bytes.extend_from_slice(id.as_bytes());
    }

    /// Write a u16 length followed by the bytes
    pub fn put_var_bytes(&mut self, field: &'static str, data: &[u8]) -> Result<()> {
        let len = u16::try_from(data.len()).map_err(|_| {
            ProtocolError::InvalidField(format!(
                "{} is {} bytes, at most {} allowed",
                field,
                data.len(),
                u16::MAX
            ))
        })?;
        self.put_u16(len);
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Bytes written so far, header included
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Deserializes packet fields with bounds checks
pub struct PacketReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        PacketReader { bytes, offset: 0 }
    }

    /// Read and validate the header, returning the type code byte
    pub fn read_header(&mut self) -> Result<u8> {
        let version = self.u8()?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        self.u8()
    }

    /// Read the header and require a specific packet type
    pub fn expect_header(&mut self, expected: PacketType) -> Result<()> {
        let code = self.read_header()?;
        if code != expected.to_u8() {
            return Err(ProtocolError::UnexpectedPacketType {
                expected: expected.code(),
                actual: code as char,
            });
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn hash(&mut self) -> Result<Hash> {
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(self.take(HASH_SIZE)?);
        Ok(Hash::from_bytes(bytes))
    }

    pub fn id(&mut self) -> Result<UniqueId> {
        let mut bytes = [0u8; UNIQUE_ID_SIZE];
        bytes.copy_from_slice(self.take(UNIQUE_ID_SIZE)?);
        Ok(UniqueId::from_bytes(bytes))
    }

    /// Read a u16 length prefix and that many bytes
    pub fn var_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    /// Require that `count` records of `record_len` bytes fill the rest of the input
    pub fn expect_records(&self, field: &'static str, count: usize, record_len: usize) -> Result<()> {
        let declared = count.saturating_mul(record_len);
        if declared != self.remaining() {
            return Err(ProtocolError::LengthMismatch {
                field,
                declared,
                actual: self.remaining(),
            });
        }
        Ok(())
    }

    /// Fail if any input is left over
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

/// Fail if `bytes` does not fit in one datagram
pub fn check_datagram_size(bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::PacketTooLarge {
            size: bytes.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_reader() {
        let mut w = PacketWriter::new(PacketType::DeletionQuery);
        w.put_u8(7);
        w.put_u16(0xBEEF);
        w.put_u32(0xDEADBEEF);
        w.put_var_bytes("data", b"abc").unwrap();
        let bytes = w.finish();
        assert_eq!(&bytes[..2], &[PROTOCOL_VERSION, b'Y']);

        let mut r = PacketReader::new(&bytes);
        r.expect_header(PacketType::DeletionQuery).unwrap();
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.u16().unwrap(), 0xBEEF);
        assert_eq!(r.u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.var_bytes().unwrap(), b"abc");
        r.finish().unwrap();
    }

    #[test]
    fn test_truncated() {
        let mut r = PacketReader::new(&[0x01]);
        assert_eq!(
            r.u32(),
            Err(ProtocolError::Truncated {
                needed: 4,
                available: 1
            })
        );
    }

    #[test]
    fn test_var_bytes_longer_than_input() {
        let mut r = PacketReader::new(&[0x00, 0x05, 1, 2]);
        assert!(matches!(r.var_bytes(), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn test_bad_version() {
        let mut r = PacketReader::new(&[3, b'E']);
        assert_eq!(r.read_header(), Err(ProtocolError::UnsupportedVersion(3)));
    }

    #[test]
    fn test_trailing_bytes() {
        let r = PacketReader::new(&[1, 2, 3]);
        assert_eq!(r.finish(), Err(ProtocolError::TrailingBytes(3)));
    }

    #[test]
    fn test_var_bytes_too_long() {
        let mut w = PacketWriter::new(PacketType::UnencryptedEmail);
        let big = vec![0u8; u16::MAX as usize + 1];
        assert!(matches!(
            w.put_var_bytes("content", &big),
            Err(ProtocolError::InvalidField(_))
        ));
    }

    #[test]
    fn test_datagram_size() {
        assert!(check_datagram_size(&vec![0u8; MAX_DATAGRAM_SIZE]).is_ok());
        assert!(check_datagram_size(&vec![0u8; MAX_DATAGRAM_SIZE + 1]).is_err());
    }
}
