//! Peer-to-peer request and response packets
//!
//! Every communication packet carries a random packet id right after the
//! header so a response can be matched to its request.
//!
//! | code | packet                     | fields after packet id                         |
//! |------|----------------------------|------------------------------------------------|
//! | `F`  | [`FindClosePeersPacket`]   | key[32]                                        |
//! | `Q`  | [`RetrieveRequest`]        | key[32], dataType u8                           |
//! | `Y`  | [`DeletionQuery`]          | dhtKey[32]                                     |
//! | `D`  | [`EmailPacketDeleteRequest`] | dhtKey[32], authorization[32]                |
//! | `X`  | [`IndexPacketDeleteRequest`] | destHash[32], count u8, (key[32], auth[32])* |
//! | `S`  | [`StoreRequest`]           | len u16, storable packet                       |
//! | `N`  | [`ResponsePacket`]         | status u8, len u16, data packet                |

use std::fmt;

use crate::codec::{PacketReader, PacketWriter, HEADER_SIZE};
use crate::error::{ProtocolError, Result};
use crate::packet::{decode_packet, Packet, PacketType, StorablePacket, WirePacket};
use crate::types::{Hash, UniqueId, HASH_SIZE, UNIQUE_ID_SIZE};

/// Most entries an `X` packet can carry
pub const MAX_INDEX_DELETE_ENTRIES: usize = u8::MAX as usize;

/// Ask a peer for the peers it knows closest to `key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindClosePeersPacket {
    pub packet_id: UniqueId,
    pub key: Hash,
}

impl FindClosePeersPacket {
    pub fn new(key: Hash) -> Self {
        FindClosePeersPacket {
            packet_id: UniqueId::random(),
            key,
        }
    }
}

impl WirePacket for FindClosePeersPacket {
    const TYPE: PacketType = PacketType::FindClosePeers;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_id(&self.packet_id);
        w.put_hash(&self.key);
        Ok(())
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        Ok(FindClosePeersPacket {
            packet_id: r.id()?,
            key: r.hash()?,
        })
    }
}

/// Ask a peer for the storable packet of type `data_type` under `key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveRequest {
    pub packet_id: UniqueId,
    pub key: Hash,
    pub data_type: PacketType,
}

impl RetrieveRequest {
    pub fn new(key: Hash, data_type: PacketType) -> Result<Self> {
        check_storable(data_type)?;
        Ok(RetrieveRequest {
            packet_id: UniqueId::random(),
            key,
            data_type,
        })
    }
}

fn check_storable(data_type: PacketType) -> Result<()> {
    if !data_type.is_storable() {
        return Err(ProtocolError::InvalidField(format!(
            "packet type {} cannot be retrieved",
            data_type
        )));
    }
    Ok(())
}

impl WirePacket for RetrieveRequest {
    const TYPE: PacketType = PacketType::RetrieveRequest;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_id(&self.packet_id);
        w.put_hash(&self.key);
        w.put_u8(self.data_type.to_u8());
        Ok(())
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        let packet_id = r.id()?;
        let key = r.hash()?;
        let data_type = PacketType::from_u8(r.u8()?)?;
        check_storable(data_type)?;
        Ok(RetrieveRequest {
            packet_id,
            key,
            data_type,
        })
    }
}

/// Ask whether the packet under `dht_key` was deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionQuery {
    pub packet_id: UniqueId,
    pub dht_key: Hash,
}

impl DeletionQuery {
    pub fn new(dht_key: Hash) -> Self {
        DeletionQuery {
            packet_id: UniqueId::random(),
            dht_key,
        }
    }
}

impl WirePacket for DeletionQuery {
    const TYPE: PacketType = PacketType::DeletionQuery;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_id(&self.packet_id);
        w.put_hash(&self.dht_key);
        Ok(())
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        Ok(DeletionQuery {
            packet_id: r.id()?,
            dht_key: r.hash()?,
        })
    }
}

/// Delete an email packet; honoured only if `SHA256(authorization)` matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailPacketDeleteRequest {
    pub packet_id: UniqueId,
    pub dht_key: Hash,
    pub authorization: UniqueId,
}

impl EmailPacketDeleteRequest {
    pub fn new(dht_key: Hash, authorization: UniqueId) -> Self {
        EmailPacketDeleteRequest {
            packet_id: UniqueId::random(),
            dht_key,
            authorization,
        }
    }
}

impl WirePacket for EmailPacketDeleteRequest {
    const TYPE: PacketType = PacketType::EmailPacketDeleteRequest;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_id(&self.packet_id);
        w.put_hash(&self.dht_key);
        w.put_id(&self.authorization);
        Ok(())
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        Ok(EmailPacketDeleteRequest {
            packet_id: r.id()?,
            dht_key: r.hash()?,
            authorization: r.id()?,
        })
    }
}

/// One entry of an [`IndexPacketDeleteRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDeleteEntry {
    pub email_packet_key: Hash,
    pub authorization: UniqueId,
}

/// Remove entries from a destination's index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPacketDeleteRequest {
    pub packet_id: UniqueId,
    pub destination_hash: Hash,
    entries: Vec<IndexDeleteEntry>,
}

impl IndexPacketDeleteRequest {
    pub fn new(destination_hash: Hash) -> Self {
        IndexPacketDeleteRequest {
            packet_id: UniqueId::random(),
            destination_hash,
            entries: Vec::new(),
        }
    }

    /// Add an entry; fails once [`MAX_INDEX_DELETE_ENTRIES`] are present
    pub fn put(&mut self, email_packet_key: Hash, authorization: UniqueId) -> Result<()> {
        if self.entries.len() >= MAX_INDEX_DELETE_ENTRIES {
            return Err(ProtocolError::InvalidField(format!(
                "index delete request holds at most {} entries",
                MAX_INDEX_DELETE_ENTRIES
            )));
        }
        self.entries.push(IndexDeleteEntry {
            email_packet_key,
            authorization,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[IndexDeleteEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WirePacket for IndexPacketDeleteRequest {
    const TYPE: PacketType = PacketType::IndexPacketDeleteRequest;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_id(&self.packet_id);
        w.put_hash(&self.destination_hash);
        w.put_u8(self.entries.len() as u8);
        for entry in &self.entries {
            w.put_hash(&entry.email_packet_key);
            w.put_id(&entry.authorization);
        }
        Ok(())
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        let packet_id = r.id()?;
        let destination_hash = r.hash()?;
        let count = r.u8()? as usize;
        r.expect_records("index delete entries", count, HASH_SIZE + UNIQUE_ID_SIZE)?;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(IndexDeleteEntry {
                email_packet_key: r.hash()?,
                authorization: r.id()?,
            });
        }
        Ok(IndexPacketDeleteRequest {
            packet_id,
            destination_hash,
            entries,
        })
    }
}

/// Ask a peer to store a packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRequest {
    pub packet_id: UniqueId,
    pub packet: StorablePacket,
}

impl StoreRequest {
    pub fn new(packet: StorablePacket) -> Self {
        StoreRequest {
            packet_id: UniqueId::random(),
            packet,
        }
    }
}

impl WirePacket for StoreRequest {
    const TYPE: PacketType = PacketType::StoreRequest;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_id(&self.packet_id);
        w.put_var_bytes("stored packet", &self.packet.encode()?)
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        let packet_id = r.id()?;
        let packet = StorablePacket::decode(r.var_bytes()?)?;
        Ok(StoreRequest { packet_id, packet })
    }
}

/// Result of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    GeneralError,
    NoDataFound,
    InvalidPacket,
    NoDiskSpace,
}

impl StatusCode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::GeneralError),
            2 => Ok(StatusCode::NoDataFound),
            3 => Ok(StatusCode::InvalidPacket),
            4 => Ok(StatusCode::NoDiskSpace),
            other => Err(ProtocolError::InvalidField(format!(
                "status code {}",
                other
            ))),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::GeneralError => 1,
            StatusCode::NoDataFound => 2,
            StatusCode::InvalidPacket => 3,
            StatusCode::NoDiskSpace => 4,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::GeneralError => "GENERAL_ERROR",
            StatusCode::NoDataFound => "NO_DATA_FOUND",
            StatusCode::InvalidPacket => "INVALID_PACKET",
            StatusCode::NoDiskSpace => "NO_DISK_SPACE",
        };
        write!(f, "{}", name)
    }
}

/// Response to a communication packet, optionally carrying a data packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    pub packet_id: UniqueId,
    pub status: StatusCode,
    pub data: Option<Box<Packet>>,
}

impl ResponsePacket {
    /// Respond to the request with id `packet_id`
    pub fn new(packet_id: UniqueId, status: StatusCode, data: Option<Packet>) -> Self {
        ResponsePacket {
            packet_id,
            status,
            data: data.map(Box::new),
        }
    }
}

impl WirePacket for ResponsePacket {
    const TYPE: PacketType = PacketType::Response;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_id(&self.packet_id);
        w.put_u8(self.status.to_u8());
        let data = match &self.data {
            Some(packet) => packet.encode()?,
            None => Vec::new(),
        };
        w.put_var_bytes("response data", &data)
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        let packet_id = r.id()?;
        let status = StatusCode::from_u8(r.u8()?)?;
        let data = r.var_bytes()?;
        let data = if data.is_empty() {
            None
        } else {
            Some(Box::new(decode_response_data(data)?))
        };
        Ok(ResponsePacket {
            packet_id,
            status,
            data,
        })
    }
}

/// Encoded size of a response around its data packet
pub const RESPONSE_OVERHEAD: usize = HEADER_SIZE + UNIQUE_ID_SIZE + 1 + 2;

/// Only data packets travel in a response. The type is checked before
/// decoding so responses cannot nest.
fn decode_response_data(bytes: &[u8]) -> Result<Packet> {
    let code = PacketReader::new(bytes).read_header()?;
    match PacketType::from_u8(code)? {
        PacketType::EncryptedEmail | PacketType::Index | PacketType::DeletionInfo => {
            decode_packet(bytes)
        }
        other => Err(ProtocolError::InvalidField(format!(
            "{} packet as response data",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EncryptedEmailPacket;
    use crate::index::{IndexPacket, IndexPacketEntry};
    use bote_crypto::CryptoId;

    fn round_trip(packet: Packet) {
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes[1], packet.packet_type().to_u8());
        assert_eq!(decode_packet(&bytes).unwrap(), packet);
    }

    fn email_packet() -> EncryptedEmailPacket {
        EncryptedEmailPacket::from_payload(vec![5; 64], Hash::digest(b"auth"), CryptoId::Ecdh256Ecdsa256)
            .unwrap()
    }

    #[test]
    fn test_simple_requests_round_trip() {
        let key = Hash::digest(b"key");
        round_trip(Packet::FindClosePeers(FindClosePeersPacket::new(key)));
        round_trip(Packet::RetrieveRequest(
            RetrieveRequest::new(key, PacketType::Index).unwrap(),
        ));
        round_trip(Packet::DeletionQuery(DeletionQuery::new(key)));
        round_trip(Packet::EmailPacketDeleteRequest(EmailPacketDeleteRequest::new(
            key,
            UniqueId::random(),
        )));
    }

    #[test]
    fn test_retrieve_request_requires_storable_type() {
        assert!(RetrieveRequest::new(Hash::digest(b"k"), PacketType::Response).is_err());

        let request = RetrieveRequest::new(Hash::digest(b"k"), PacketType::EncryptedEmail).unwrap();
        let mut bytes = request.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = b'D';
        assert!(matches!(
            decode_packet(&bytes),
            Err(ProtocolError::InvalidField(_))
        ));
    }

    #[test]
    fn test_index_delete_request() {
        let mut request = IndexPacketDeleteRequest::new(Hash::digest(b"dest"));
        for i in 0..MAX_INDEX_DELETE_ENTRIES {
            request
                .put(Hash::digest(&(i as u32).to_be_bytes()), UniqueId::random())
                .unwrap();
        }
        assert!(request.put(Hash::digest(b"one more"), UniqueId::random()).is_err());
        round_trip(Packet::IndexPacketDeleteRequest(request));
        round_trip(Packet::IndexPacketDeleteRequest(IndexPacketDeleteRequest::new(
            Hash::digest(b"empty"),
        )));
    }

    #[test]
    fn test_store_request_round_trip() {
        round_trip(Packet::StoreRequest(StoreRequest::new(
            StorablePacket::EncryptedEmail(email_packet()),
        )));

        let mut index = IndexPacket::new(Hash::digest(b"dest"));
        index.put(IndexPacketEntry {
            email_packet_key: Hash::digest(b"e"),
            delete_verification_hash: Hash::digest(b"v"),
            store_time: 42,
        });
        round_trip(Packet::StoreRequest(StoreRequest::new(StorablePacket::Index(index))));
    }

    #[test]
    fn test_store_request_with_nested_garbage() {
        let request = StoreRequest::new(StorablePacket::EncryptedEmail(email_packet()));
        let mut bytes = request.to_bytes().unwrap();
        // corrupt the nested packet's version byte
        bytes[HEADER_SIZE + UNIQUE_ID_SIZE + 2] = 9;
        assert_eq!(decode_packet(&bytes), Err(ProtocolError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_response_round_trip() {
        let id = UniqueId::random();
        round_trip(Packet::Response(ResponsePacket::new(id, StatusCode::NoDataFound, None)));
        round_trip(Packet::Response(ResponsePacket::new(
            id,
            StatusCode::Ok,
            Some(Packet::EncryptedEmail(email_packet())),
        )));
    }

    #[test]
    fn test_response_rejects_non_data_packets() {
        let inner = ResponsePacket::new(UniqueId::random(), StatusCode::Ok, None);
        let nested = ResponsePacket::new(UniqueId::random(), StatusCode::Ok, Some(inner.into()));
        let bytes = nested.to_bytes().unwrap();
        assert!(matches!(
            decode_packet(&bytes),
            Err(ProtocolError::InvalidField(_))
        ));

        let query = DeletionQuery::new(Hash::digest(b"k"));
        let carrying_request = ResponsePacket::new(UniqueId::random(), StatusCode::Ok, Some(query.into()));
        assert!(decode_packet(&carrying_request.to_bytes().unwrap()).is_err());
    }

    #[test]
    fn test_deeply_nested_response_is_rejected() {
        let mut bytes = ResponsePacket::new(UniqueId::random(), StatusCode::Ok, None)
            .to_bytes()
            .unwrap();
        for _ in 0..800 {
            let mut w = PacketWriter::new(PacketType::Response);
            w.put_id(&UniqueId::random());
            w.put_u8(StatusCode::Ok.to_u8());
            w.put_var_bytes("response data", &bytes).unwrap();
            bytes = w.finish();
        }
        assert!(matches!(
            decode_packet(&bytes),
            Err(ProtocolError::InvalidField(_))
        ));
    }

    #[test]
    fn test_response_overhead() {
        let packet = Packet::EncryptedEmail(email_packet());
        let data_len = packet.encode().unwrap().len();
        let response = ResponsePacket::new(UniqueId::random(), StatusCode::Ok, Some(packet));
        assert_eq!(response.to_bytes().unwrap().len(), data_len + RESPONSE_OVERHEAD);
    }

    #[test]
    fn test_status_codes() {
        for code in 0..=4u8 {
            assert_eq!(StatusCode::from_u8(code).unwrap().to_u8(), code);
        }
        assert!(StatusCode::from_u8(5).is_err());
        assert_eq!(StatusCode::NoDiskSpace.to_string(), "NO_DISK_SPACE");
    }
}
