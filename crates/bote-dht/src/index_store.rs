//! Storage-peer side of index packets, one per destination

use std::sync::{Arc, Mutex, MutexGuard};

use bote_protocol::{
    now, DhtStorable, Hash, IndexPacket, IndexPacketDeleteRequest, IndexPacketEntry, WirePacket,
};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::expiration::{cutoff, Expirable, EXPIRATION_TIME_SECS};
use crate::folder::Folder;
use crate::quota::StorageQuota;

pub struct IndexPacketStore {
    folder: Box<dyn Folder>,
    quota: Arc<StorageQuota>,
    retention_secs: u32,
    lock: Mutex<()>,
}

impl IndexPacketStore {
    pub fn open(folder: Box<dyn Folder>, quota: Arc<StorageQuota>) -> Result<Self> {
        let mut existing = 0u64;
        for name in folder.list()? {
            if let Some(data) = folder.get(&name)? {
                existing += data.len() as u64;
            }
        }
        quota.charge(existing);

        Ok(IndexPacketStore {
            folder,
            quota,
            retention_secs: EXPIRATION_TIME_SECS,
            lock: Mutex::new(()),
        })
    }

    pub fn with_retention(mut self, retention_secs: u32) -> Self {
        self.retention_secs = retention_secs;
        self
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn store(&self, packet: &IndexPacket) -> Result<usize> {
        self.store_at(packet, now())
    }

    /// Merge `packet` into the stored index for its destination
    ///
    /// New entries are stamped with `store_time`; entries already present
    /// keep their original time. Returns the number of entries added.
    pub fn store_at(&self, packet: &IndexPacket, store_time: u32) -> Result<usize> {
        let _guard = self.guard();
        let destination = packet.dht_key();
        let (index, old_len) = self.load(&destination)?;
        let mut index = index.unwrap_or_else(|| IndexPacket::new(destination));

        let mut added = 0;
        for entry in packet.entries() {
            let stamped = IndexPacketEntry {
                store_time,
                ..*entry
            };
            if index.put(stamped) {
                added += 1;
            }
        }
        if added == 0 && old_len > 0 {
            return Ok(0);
        }

        self.save(&index, old_len)?;
        debug!("index {}: {} new entries, {} total", destination, added, index.len());
        Ok(added)
    }

    pub fn get(&self, destination: &Hash) -> Result<Option<IndexPacket>> {
        Ok(self.load(destination)?.0)
    }

    /// Remove entries whose verification hash matches the supplied authorization
    ///
    /// Entries with a wrong authorization are kept without complaint.
    pub fn process_delete_request(&self, request: &IndexPacketDeleteRequest) -> Result<usize> {
        let _guard = self.guard();
        let (Some(mut index), old_len) = self.load(&request.destination_hash)? else {
            return Ok(0);
        };

        let mut removed = 0;
        for entry in request.entries() {
            let authorized = index
                .get(&entry.email_packet_key)
                .map(|e| e.delete_verification_hash == entry.authorization.hash())
                .unwrap_or(false);
            if authorized {
                index.remove(&entry.email_packet_key);
                removed += 1;
            } else {
                debug!(
                    "index {}: no authorized entry for {}",
                    request.destination_hash, entry.email_packet_key
                );
            }
        }

        if removed > 0 {
            self.save(&index, old_len)?;
        }
        Ok(removed)
    }

    /// Destinations with a stored index
    pub fn destinations(&self) -> Result<Vec<Hash>> {
        Ok(self
            .folder
            .list()?
            .iter()
            .filter_map(|name| Hash::from_base64(name).ok())
            .collect())
    }

    /// Stored index and its size on disk. A corrupt index reads as absent
    /// but still reports its size, so overwriting it settles the quota.
    fn load(&self, destination: &Hash) -> Result<(Option<IndexPacket>, usize)> {
        let name = destination.to_base64();
        let Some(bytes) = self.folder.get(&name)? else {
            return Ok((None, 0));
        };
        match IndexPacket::from_bytes(&bytes) {
            Ok(index) => Ok((Some(index), bytes.len())),
            Err(e) => {
                warn!("skipping corrupt index packet {}: {}", name, e);
                Ok((None, bytes.len()))
            }
        }
    }

    /// Write an index, adjusting the quota by the size difference
    fn save(&self, index: &IndexPacket, old_len: usize) -> Result<()> {
        let bytes = index.to_bytes()?;
        if bytes.len() > old_len {
            self.quota.reserve((bytes.len() - old_len) as u64)?;
        }
        if let Err(e) = self.folder.put(&index.dht_key().to_base64(), &bytes) {
            if bytes.len() > old_len {
                self.quota.release((bytes.len() - old_len) as u64);
            }
            return Err(e);
        }
        if bytes.len() < old_len {
            self.quota.release((old_len - bytes.len()) as u64);
        }
        Ok(())
    }
}

impl Expirable for IndexPacketStore {
    /// Prunes old entries; an index left empty stays in place
    fn delete_expired_at(&self, now: u32) -> Result<usize> {
        let cutoff = cutoff(now, self.retention_secs);
        let _guard = self.guard();

        let mut removed = 0;
        for destination in self.destinations()? {
            let (Some(mut index), old_len) = self.load(&destination)? else {
                continue;
            };
            let dropped = index.remove_older_than(cutoff);
            if dropped > 0 {
                self.save(&index, old_len)?;
                removed += dropped;
            }
        }
        if removed > 0 {
            info!("expired {} index entries", removed);
        }
        Ok(removed)
    }
}
