//! Per-destination index of stored email packets
//!
//! `I` layout: destinationHash[32], count u32, then `count` entries of
//! emailPacketKey[32], deleteVerificationHash[32], storeTime u32.

use std::collections::HashSet;

use crate::codec::{PacketReader, PacketWriter, HEADER_SIZE, MAX_DATAGRAM_SIZE};
use crate::error::{ProtocolError, Result};
use crate::packet::{DhtStorable, PacketType, Splittable, WirePacket};
use crate::types::{Hash, HASH_SIZE};

/// Encoded size of one index entry
pub const INDEX_ENTRY_SIZE: usize = 2 * HASH_SIZE + 4;

/// Encoded size of an index packet without entries
pub const INDEX_OVERHEAD: usize = HEADER_SIZE + HASH_SIZE + 4;

/// Most entries that fit in one datagram
pub const MAX_ENTRIES_PER_DATAGRAM: usize = (MAX_DATAGRAM_SIZE - INDEX_OVERHEAD) / INDEX_ENTRY_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexPacketEntry {
    pub email_packet_key: Hash,
    pub delete_verification_hash: Hash,
    pub store_time: u32,
}

/// Email packet keys stored for one destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPacket {
    destination_hash: Hash,
    entries: Vec<IndexPacketEntry>,
}

impl IndexPacket {
    /// Create an empty index for a destination
    pub fn new(destination_hash: Hash) -> Self {
        IndexPacket {
            destination_hash,
            entries: Vec::new(),
        }
    }

    /// Merge several index packets, keeping the first packet's destination
    ///
    /// Entries are deduplicated by email packet key; the first occurrence
    /// wins. Returns `None` for an empty input.
    pub fn merge<'a, I>(packets: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a IndexPacket>,
    {
        let mut packets = packets.into_iter();
        let mut merged = packets.next()?.clone();
        let mut seen: HashSet<Hash> = merged.entries.iter().map(|e| e.email_packet_key).collect();
        for packet in packets {
            for entry in &packet.entries {
                if seen.insert(entry.email_packet_key) {
                    merged.entries.push(*entry);
                }
            }
        }
        Some(merged)
    }

    /// Add an entry unless one with the same key exists. Returns whether it was added.
    pub fn put(&mut self, entry: IndexPacketEntry) -> bool {
        if self.contains(&entry.email_packet_key) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove the entry for `email_packet_key`
    pub fn remove(&mut self, email_packet_key: &Hash) -> Option<IndexPacketEntry> {
        let position = self
            .entries
            .iter()
            .position(|e| e.email_packet_key == *email_packet_key)?;
        Some(self.entries.remove(position))
    }

    pub fn get(&self, email_packet_key: &Hash) -> Option<&IndexPacketEntry> {
        self.entries
            .iter()
            .find(|e| e.email_packet_key == *email_packet_key)
    }

    pub fn contains(&self, email_packet_key: &Hash) -> bool {
        self.get(email_packet_key).is_some()
    }

    /// Drop entries stored before `cutoff`; returns how many were dropped
    pub fn remove_older_than(&mut self, cutoff: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.store_time >= cutoff);
        before - self.entries.len()
    }

    pub fn destination_hash(&self) -> &Hash {
        &self.destination_hash
    }

    pub fn entries(&self) -> &[IndexPacketEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the wire encoding
    pub fn encoded_len(&self) -> usize {
        INDEX_OVERHEAD + self.entries.len() * INDEX_ENTRY_SIZE
    }

    /// Split into packets that each encode to at most `max_len` bytes
    ///
    /// All entries have the same size so greedy filling gives the fewest
    /// packets. An empty index stays a single packet. Fails when `max_len`
    /// cannot hold even one entry.
    pub fn split_within(&self, max_len: usize) -> Result<Vec<Self>> {
        if self.encoded_len() <= max_len {
            return Ok(vec![self.clone()]);
        }

        let per_packet = max_len.saturating_sub(INDEX_OVERHEAD) / INDEX_ENTRY_SIZE;
        if per_packet == 0 {
            return Err(ProtocolError::PacketTooLarge {
                size: INDEX_OVERHEAD + INDEX_ENTRY_SIZE,
                max: max_len,
            });
        }

        Ok(self.chunked(per_packet))
    }

    fn chunked(&self, per_packet: usize) -> Vec<Self> {
        self.entries
            .chunks(per_packet)
            .map(|chunk| IndexPacket {
                destination_hash: self.destination_hash,
                entries: chunk.to_vec(),
            })
            .collect()
    }
}

impl DhtStorable for IndexPacket {
    fn dht_key(&self) -> Hash {
        self.destination_hash
    }
}

impl Splittable for IndexPacket {
    /// Fill sub-packets in entry order, each fitting one datagram
    fn split(&self) -> Vec<Self> {
        if self.encoded_len() <= MAX_DATAGRAM_SIZE {
            return vec![self.clone()];
        }
        self.chunked(MAX_ENTRIES_PER_DATAGRAM)
    }
}

impl WirePacket for IndexPacket {
    const TYPE: PacketType = PacketType::Index;

    fn write_fields(&self, w: &mut PacketWriter) -> Result<()> {
        w.put_hash(&self.destination_hash);
        w.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            w.put_hash(&entry.email_packet_key);
            w.put_hash(&entry.delete_verification_hash);
            w.put_u32(entry.store_time);
        }
        Ok(())
    }

    fn read_fields(r: &mut PacketReader<'_>) -> Result<Self> {
        let destination_hash = r.hash()?;
        let count = r.u32()? as usize;
        r.expect_records("index entries", count, INDEX_ENTRY_SIZE)?;

        let mut seen = HashSet::with_capacity(count);
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let entry = IndexPacketEntry {
                email_packet_key: r.hash()?,
                delete_verification_hash: r.hash()?,
                store_time: r.u32()?,
            };
            if !seen.insert(entry.email_packet_key) {
                return Err(ProtocolError::InvalidField(format!(
                    "duplicate index entry {}",
                    entry.email_packet_key
                )));
            }
            entries.push(entry);
        }

        Ok(IndexPacket {
            destination_hash,
            entries,
        })
    }
}
