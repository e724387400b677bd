//! Deletion records returned for deletion queries
//!
//! `T` layout: count u32, then `count` entries of dhtKey[32],
//! deleteAuthorization[32], storeTime u32.

use crate::codec::{PacketReader, PacketWriter};
use crate::error::Result;
use crate::packet::{PacketType, WirePacket};
use crate::types::{Hash, UniqueId, HASH_SIZE, UNIQUE_ID_SIZE};

pub const DELETION_ENTRY_SIZE: usize = HASH_SIZE + UNIQUE_ID_SIZE + 4;

/// A packet that was deleted, with the authorization that deleted it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionRecord {
    pub dht_key: Hash,
    pub delete_authorization: UniqueId,
    pub store_time: u32,
}

/// Proof that packets were deleted, so peers holding copies can delete theirs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionInfoPacket {
    entries: Vec<DeletionRecord>,
}

impl DeletionInfoPacket {
    pub fn new(entries: Vec<DeletionRecord>) -> Self {
        DeletionInfoPacket { entries }
    }

    pub fn get(&self, dht_key: &Hash) -> Option<&DeletionRecord> {
        self.entries.iter().find(|e| e.dht_key == *dht_key)
    }

    pub fn contains(&self, dht_key: &Hash) -> bool {
        self.get(dht_key).is_some()
    }

    pub fn entries(&self) -> &[DeletionRecord] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WirePacket for DeletionInfoPacket {
    const TYPE: PacketType = PacketType::DeletionInfo;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            w.put_hash(&entry.dht_key);
            w.put_id(&entry.delete_authorization);
            w.put_u32(entry.store_time);
        }
        Ok(())
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        let count = r.u32()? as usize;
        r.expect_records("deletion records", count, DELETION_ENTRY_SIZE)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(DeletionRecord {
                dht_key: r.hash()?,
                delete_authorization: r.id()?,
                store_time: r.u32()?,
            });
        }
        Ok(DeletionInfoPacket { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_lookup() {
        let auth = UniqueId::random();
        let record = DeletionRecord {
            dht_key: Hash::digest(b"packet"),
            delete_authorization: auth,
            store_time: 1234,
        };
        let packet = DeletionInfoPacket::new(vec![record]);
        let decoded = DeletionInfoPacket::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.get(&Hash::digest(b"packet")).unwrap().delete_authorization, auth);
        assert!(!decoded.contains(&Hash::digest(b"other")));
    }

    #[test]
    fn test_empty() {
        let packet = DeletionInfoPacket::default();
        let decoded = DeletionInfoPacket::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert!(decoded.is_empty());
    }
}
