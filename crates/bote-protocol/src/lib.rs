//! Bote wire protocol
//!
//! Packet types, their binary encodings and the fixed-size identifiers
//! (hashes and unique ids) shared by storage and mail handling.
//!
//! Every packet starts with a two byte header: the protocol version and an
//! ASCII type code. Multi-byte integers are big-endian.

pub mod codec;
pub mod communication;
pub mod deletion;
pub mod email;
pub mod error;
pub mod index;
pub mod packet;
pub mod types;

pub use codec::{check_datagram_size, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
pub use communication::{
    DeletionQuery, EmailPacketDeleteRequest, FindClosePeersPacket, IndexDeleteEntry,
    IndexPacketDeleteRequest, ResponsePacket, RetrieveRequest, StatusCode, StoreRequest,
    RESPONSE_OVERHEAD,
};
pub use deletion::{DeletionInfoPacket, DeletionRecord};
pub use email::{EncryptedEmailPacket, UnencryptedEmailPacket};
pub use error::{ProtocolError, Result};
pub use index::{IndexPacket, IndexPacketEntry};
pub use packet::{
    decode_packet, DhtStorable, Packet, PacketType, Splittable, StorablePacket, WirePacket,
};
pub use types::{now, Hash, UniqueId};
