//! Packet types and table-driven decoding
//!
//! Each packet struct implements [`WirePacket`]. [`decode_packet`] reads the
//! header, looks the type code up in a static decoder table and hands the
//! reader to that packet's field decoder.

use std::fmt;

use crate::codec::{PacketReader, PacketWriter};
use crate::communication::{
    DeletionQuery, EmailPacketDeleteRequest, FindClosePeersPacket, IndexPacketDeleteRequest,
    ResponsePacket, RetrieveRequest, StoreRequest,
};
use crate::deletion::DeletionInfoPacket;
use crate::email::{EncryptedEmailPacket, UnencryptedEmailPacket};
use crate::error::{ProtocolError, Result};
use crate::index::IndexPacket;
use crate::types::Hash;

/// One-byte ASCII packet type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    EncryptedEmail,
    Index,
    UnencryptedEmail,
    DeletionInfo,
    FindClosePeers,
    RetrieveRequest,
    DeletionQuery,
    EmailPacketDeleteRequest,
    IndexPacketDeleteRequest,
    StoreRequest,
    Response,
}

impl PacketType {
    /// Convert from the wire byte
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            b'E' => Ok(PacketType::EncryptedEmail),
            b'I' => Ok(PacketType::Index),
            b'U' => Ok(PacketType::UnencryptedEmail),
            b'T' => Ok(PacketType::DeletionInfo),
            b'F' => Ok(PacketType::FindClosePeers),
            b'Q' => Ok(PacketType::RetrieveRequest),
            b'Y' => Ok(PacketType::DeletionQuery),
            b'D' => Ok(PacketType::EmailPacketDeleteRequest),
            b'X' => Ok(PacketType::IndexPacketDeleteRequest),
            b'S' => Ok(PacketType::StoreRequest),
            b'N' => Ok(PacketType::Response),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    /// Convert to the wire byte
    pub fn to_u8(self) -> u8 {
        match self {
            PacketType::EncryptedEmail => b'E',
            PacketType::Index => b'I',
            PacketType::UnencryptedEmail => b'U',
            PacketType::DeletionInfo => b'T',
            PacketType::FindClosePeers => b'F',
            PacketType::RetrieveRequest => b'Q',
            PacketType::DeletionQuery => b'Y',
            PacketType::EmailPacketDeleteRequest => b'D',
            PacketType::IndexPacketDeleteRequest => b'X',
            PacketType::StoreRequest => b'S',
            PacketType::Response => b'N',
        }
    }

    pub fn code(self) -> char {
        self.to_u8() as char
    }

    /// Peer-to-peer request/response packets (they carry a packet id)
    pub fn is_communication(self) -> bool {
        matches!(
            self,
            PacketType::FindClosePeers
                | PacketType::RetrieveRequest
                | PacketType::DeletionQuery
                | PacketType::EmailPacketDeleteRequest
                | PacketType::IndexPacketDeleteRequest
                | PacketType::StoreRequest
                | PacketType::Response
        )
    }

    /// Packets that live in the DHT keyspace
    pub fn is_storable(self) -> bool {
        matches!(self, PacketType::EncryptedEmail | PacketType::Index)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A packet with a fixed wire layout
pub trait WirePacket: Sized {
    const TYPE: PacketType;

    /// Write all fields after the header
    fn write_fields(&self, writer: &mut PacketWriter) -> Result<()>;

    /// Read all fields after the header
    fn read_fields(reader: &mut PacketReader<'_>) -> Result<Self>;

    /// Encode header and fields
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = PacketWriter::new(Self::TYPE);
        self.write_fields(&mut writer)?;
        Ok(writer.finish())
    }

    /// Decode a packet that must be of this type
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = PacketReader::new(bytes);
        reader.expect_header(Self::TYPE)?;
        let packet = Self::read_fields(&mut reader)?;
        reader.finish()?;
        Ok(packet)
    }
}

/// A packet addressable in the DHT keyspace
pub trait DhtStorable {
    fn dht_key(&self) -> Hash;
}

/// A packet that can partition itself into datagram-sized pieces
pub trait Splittable: Sized {
    fn split(&self) -> Vec<Self>;
}

/// Any decoded packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    EncryptedEmail(EncryptedEmailPacket),
    Index(IndexPacket),
    UnencryptedEmail(UnencryptedEmailPacket),
    DeletionInfo(DeletionInfoPacket),
    FindClosePeers(FindClosePeersPacket),
    RetrieveRequest(RetrieveRequest),
    DeletionQuery(DeletionQuery),
    EmailPacketDeleteRequest(EmailPacketDeleteRequest),
    IndexPacketDeleteRequest(IndexPacketDeleteRequest),
    StoreRequest(StoreRequest),
    Response(ResponsePacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::EncryptedEmail(_) => PacketType::EncryptedEmail,
            Packet::Index(_) => PacketType::Index,
            Packet::UnencryptedEmail(_) => PacketType::UnencryptedEmail,
            Packet::DeletionInfo(_) => PacketType::DeletionInfo,
            Packet::FindClosePeers(_) => PacketType::FindClosePeers,
            Packet::RetrieveRequest(_) => PacketType::RetrieveRequest,
            Packet::DeletionQuery(_) => PacketType::DeletionQuery,
            Packet::EmailPacketDeleteRequest(_) => PacketType::EmailPacketDeleteRequest,
            Packet::IndexPacketDeleteRequest(_) => PacketType::IndexPacketDeleteRequest,
            Packet::StoreRequest(_) => PacketType::StoreRequest,
            Packet::Response(_) => PacketType::Response,
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Packet::EncryptedEmail(p) => p.to_bytes(),
            Packet::Index(p) => p.to_bytes(),
            Packet::UnencryptedEmail(p) => p.to_bytes(),
            Packet::DeletionInfo(p) => p.to_bytes(),
            Packet::FindClosePeers(p) => p.to_bytes(),
            Packet::RetrieveRequest(p) => p.to_bytes(),
            Packet::DeletionQuery(p) => p.to_bytes(),
            Packet::EmailPacketDeleteRequest(p) => p.to_bytes(),
            Packet::IndexPacketDeleteRequest(p) => p.to_bytes(),
            Packet::StoreRequest(p) => p.to_bytes(),
            Packet::Response(p) => p.to_bytes(),
        }
    }
}

/// A DHT-storable packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorablePacket {
    EncryptedEmail(EncryptedEmailPacket),
    Index(IndexPacket),
}

impl StorablePacket {
    pub fn packet_type(&self) -> PacketType {
        match self {
            StorablePacket::EncryptedEmail(_) => PacketType::EncryptedEmail,
            StorablePacket::Index(_) => PacketType::Index,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            StorablePacket::EncryptedEmail(p) => p.to_bytes(),
            StorablePacket::Index(p) => p.to_bytes(),
        }
    }

    /// Decode bytes that must hold a storable packet
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        match decode_packet(bytes)? {
            Packet::EncryptedEmail(p) => Ok(StorablePacket::EncryptedEmail(p)),
            Packet::Index(p) => Ok(StorablePacket::Index(p)),
            other => Err(ProtocolError::InvalidField(format!(
                "packet type {} is not storable",
                other.packet_type()
            ))),
        }
    }
}

impl DhtStorable for StorablePacket {
    fn dht_key(&self) -> Hash {
        match self {
            StorablePacket::EncryptedEmail(p) => p.dht_key(),
            StorablePacket::Index(p) => p.dht_key(),
        }
    }
}

impl From<StorablePacket> for Packet {
    fn from(packet: StorablePacket) -> Self {
        match packet {
            StorablePacket::EncryptedEmail(p) => Packet::EncryptedEmail(p),
            StorablePacket::Index(p) => Packet::Index(p),
        }
    }
}

macro_rules! packet_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Packet {
                fn from(packet: $ty) -> Self {
                    Packet::$variant(packet)
                }
            }
        )*
    };
}

packet_from!(
    EncryptedEmail(EncryptedEmailPacket),
    Index(IndexPacket),
    UnencryptedEmail(UnencryptedEmailPacket),
    DeletionInfo(DeletionInfoPacket),
    FindClosePeers(FindClosePeersPacket),
    RetrieveRequest(RetrieveRequest),
    DeletionQuery(DeletionQuery),
    EmailPacketDeleteRequest(EmailPacketDeleteRequest),
    IndexPacketDeleteRequest(IndexPacketDeleteRequest),
    StoreRequest(StoreRequest),
    Response(ResponsePacket),
);

type Decoder = fn(&mut PacketReader<'_>) -> Result<Packet>;

fn decode_as<P: WirePacket + Into<Packet>>(reader: &mut PacketReader<'_>) -> Result<Packet> {
    P::read_fields(reader).map(Into::into)
}

/// Type code to field decoder
static DECODERS: &[(PacketType, Decoder)] = &[
    (PacketType::EncryptedEmail, decode_as::<EncryptedEmailPacket>),
    (PacketType::Index, decode_as::<IndexPacket>),
    (PacketType::UnencryptedEmail, decode_as::<UnencryptedEmailPacket>),
    (PacketType::DeletionInfo, decode_as::<DeletionInfoPacket>),
    (PacketType::FindClosePeers, decode_as::<FindClosePeersPacket>),
    (PacketType::RetrieveRequest, decode_as::<RetrieveRequest>),
    (PacketType::DeletionQuery, decode_as::<DeletionQuery>),
    (PacketType::EmailPacketDeleteRequest, decode_as::<EmailPacketDeleteRequest>),
    (PacketType::IndexPacketDeleteRequest, decode_as::<IndexPacketDeleteRequest>),
    (PacketType::StoreRequest, decode_as::<StoreRequest>),
    (PacketType::Response, decode_as::<ResponsePacket>),
];

/// Decode any packet from wire bytes
pub fn decode_packet(bytes: &[u8]) -> Result<Packet> {
    let mut reader = PacketReader::new(bytes);
    let code = reader.read_header()?;
    let packet_type = PacketType::from_u8(code)?;

    let decoder = DECODERS
        .iter()
        .find(|(t, _)| *t == packet_type)
        .map(|(_, decoder)| *decoder)
        .ok_or(ProtocolError::UnknownPacketType(code))?;

    let packet = decoder(&mut reader)?;
    reader.finish()?;
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PROTOCOL_VERSION;

    #[test]
    fn test_packet_type_round_trip() {
        for code in 0u8..=255 {
            if let Ok(t) = PacketType::from_u8(code) {
                assert_eq!(t.to_u8(), code);
            }
        }
    }

    #[test]
    fn test_every_type_has_a_decoder() {
        for code in b"EIUTFQYDXSN" {
            let t = PacketType::from_u8(*code).unwrap();
            assert!(DECODERS.iter().any(|(d, _)| *d == t), "no decoder for {}", t);
        }
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            decode_packet(&[PROTOCOL_VERSION, b'Z']),
            Err(ProtocolError::UnknownPacketType(b'Z'))
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            decode_packet(&[]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_storable_decode_rejects_communication_packet() {
        let query = DeletionQuery::new(Hash::digest(b"k"));
        let bytes = query.to_bytes().unwrap();
        assert!(matches!(
            StorablePacket::decode(&bytes),
            Err(ProtocolError::InvalidField(_))
        ));
    }

    #[test]
    fn test_wrong_type_for_from_bytes() {
        let query = DeletionQuery::new(Hash::digest(b"k"));
        let bytes = query.to_bytes().unwrap();
        assert!(matches!(
            FindClosePeersPacket::from_bytes(&bytes),
            Err(ProtocolError::UnexpectedPacketType { .. })
        ));
    }
}
