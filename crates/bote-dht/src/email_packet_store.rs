//! Storage-peer side of encrypted email packets
//!
//! Packets are stored under the I2P base64 form of their DHT key. The store
//! never sees delete authorizations in advance: a delete request is honoured
//! only if `SHA256(authorization)` equals the packet's delete verification
//! hash. Deleted keys leave a deletion record behind so the packet is not
//! stored again and deletion queries can be answered.

use std::sync::{Arc, Mutex, MutexGuard};

use bote_protocol::{
    now, DeletionInfoPacket, DeletionRecord, DhtStorable, EmailPacketDeleteRequest,
    EncryptedEmailPacket, Hash, UniqueId, WirePacket,
};
use tracing::{debug, info, warn};

use crate::error::{DhtError, Result};
use crate::expiration::{cutoff, Expirable, EXPIRATION_TIME_SECS};
use crate::folder::Folder;
use crate::quota::StorageQuota;

const DELETION_RECORD_LEN: usize = 32 + 4;

/// Encrypted email packets held on behalf of the network
pub struct EmailPacketStore {
    packets: Box<dyn Folder>,
    deletions: Box<dyn Folder>,
    quota: Arc<StorageQuota>,
    retention_secs: u32,
    lock: Mutex<()>,
}

impl EmailPacketStore {
    /// Open a store over two folders, charging existing packets to `quota`
    pub fn open(
        packets: Box<dyn Folder>,
        deletions: Box<dyn Folder>,
        quota: Arc<StorageQuota>,
    ) -> Result<Self> {
        let mut existing = 0u64;
        for name in packets.list()? {
            if let Some(data) = packets.get(&name)? {
                existing += data.len() as u64;
            }
        }
        quota.charge(existing);

        Ok(EmailPacketStore {
            packets,
            deletions,
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

    /// Store a packet stamped with the current time
    pub fn store(&self, packet: EncryptedEmailPacket) -> Result<bool> {
        self.store_at(packet, now())
    }

    /// Store a packet stamped with `store_time`
    ///
    /// Returns `false` if a packet with the same key is already stored.
    /// Packets whose key doesn't match their payload, or whose key was
    /// deleted before, are refused.
    pub fn store_at(&self, mut packet: EncryptedEmailPacket, store_time: u32) -> Result<bool> {
        let key = packet.dht_key();
        if !packet.verify_dht_key() {
            return Err(DhtError::InvalidDhtKey {
                declared: key,
                computed: EncryptedEmailPacket::compute_dht_key(packet.encrypted_payload()),
            });
        }

        let _guard = self.guard();
        let name = key.to_base64();
        if self.deletions.get(&name)?.is_some() {
            return Err(DhtError::AlreadyDeleted(key));
        }
        if self.packets.get(&name)?.is_some() {
            debug!("email packet {} already stored", key);
            return Ok(false);
        }

        packet.set_store_time(store_time);
        let bytes = packet.to_bytes()?;
        self.quota.reserve(bytes.len() as u64)?;
        if let Err(e) = self.packets.put(&name, &bytes) {
            self.quota.release(bytes.len() as u64);
            return Err(e);
        }
        debug!("stored email packet {} ({} bytes)", key, bytes.len());
        Ok(true)
    }

    /// Look up a packet; unreadable entries are logged and treated as absent
    pub fn get(&self, key: &Hash) -> Result<Option<EncryptedEmailPacket>> {
        let name = key.to_base64();
        let Some(bytes) = self.packets.get(&name)? else {
            return Ok(None);
        };
        match EncryptedEmailPacket::from_bytes(&bytes) {
            Ok(packet) => Ok(Some(packet)),
            Err(e) => {
                warn!("skipping corrupt email packet {}: {}", name, e);
                Ok(None)
            }
        }
    }

    pub fn contains(&self, key: &Hash) -> Result<bool> {
        Ok(self.packets.get(&key.to_base64())?.is_some())
    }

    /// Keys of all stored packets
    pub fn keys(&self) -> Result<Vec<Hash>> {
        Ok(self
            .packets
            .list()?
            .iter()
            .filter_map(|name| Hash::from_base64(name).ok())
            .collect())
    }

    pub fn process_delete_request(&self, request: &EmailPacketDeleteRequest) -> Result<bool> {
        self.delete_at(&request.dht_key, &request.authorization, now())
    }

    /// Delete a packet if `authorization` hashes to its verification hash
    ///
    /// A mismatch leaves the packet in place and is not an error.
    pub fn delete_at(&self, key: &Hash, authorization: &UniqueId, time: u32) -> Result<bool> {
        let _guard = self.guard();
        let name = key.to_base64();
        let Some(bytes) = self.packets.get(&name)? else {
            debug!("delete request for unknown email packet {}", key);
            return Ok(false);
        };
        let packet = EncryptedEmailPacket::from_bytes(&bytes)?;
        if !packet.is_delete_authorization_valid(authorization) {
            debug!("delete authorization mismatch for email packet {}", key);
            return Ok(false);
        }

        self.deletions
            .put(&name, &encode_deletion(authorization, time))?;
        if self.packets.delete(&name)? {
            self.quota.release(bytes.len() as u64);
        }
        debug!("deleted email packet {}", key);
        Ok(true)
    }

    pub fn deletion_record(&self, key: &Hash) -> Result<Option<DeletionRecord>> {
        let name = key.to_base64();
        match self.deletions.get(&name)? {
            Some(bytes) => decode_deletion(&name, *key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Answer to a deletion query, if the key was deleted here
    pub fn deletion_info(&self, key: &Hash) -> Result<Option<DeletionInfoPacket>> {
        Ok(self
            .deletion_record(key)?
            .map(|record| DeletionInfoPacket::new(vec![record])))
    }

    /// Apply deletion records learned from another peer
    ///
    /// Each record is verified against the local packet, so a forged
    /// record cannot delete anything.
    pub fn apply_deletion_info(&self, info: &DeletionInfoPacket) -> Result<usize> {
        let mut deleted = 0;
        for record in info.entries() {
            if self.delete_at(&record.dht_key, &record.delete_authorization, record.store_time)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.packets.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn encode_deletion(authorization: &UniqueId, time: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(DELETION_RECORD_LEN);
    bytes.extend_from_slice(authorization.as_bytes());
    bytes.extend_from_slice(&time.to_be_bytes());
    bytes
}

fn decode_deletion(name: &str, dht_key: Hash, bytes: &[u8]) -> Result<DeletionRecord> {
    if bytes.len() != DELETION_RECORD_LEN {
        return Err(DhtError::CorruptEntry {
            name: name.to_string(),
            reason: format!("deletion record of {} bytes", bytes.len()),
        });
    }
    let mut auth = [0u8; 32];
    auth.copy_from_slice(&bytes[..32]);
    let mut time = [0u8; 4];
    time.copy_from_slice(&bytes[32..]);
    Ok(DeletionRecord {
        dht_key,
        delete_authorization: UniqueId::from_bytes(auth),
        store_time: u32::from_be_bytes(time),
    })
}

impl Expirable for EmailPacketStore {
    fn delete_expired_at(&self, now: u32) -> Result<usize> {
        let cutoff = cutoff(now, self.retention_secs);
        let _guard = self.guard();

        let mut removed = 0;
        for name in self.packets.list()? {
            let Some(bytes) = self.packets.get(&name)? else {
                continue;
            };
            let expired = match EncryptedEmailPacket::from_bytes(&bytes) {
                Ok(packet) => packet.store_time() < cutoff,
                Err(e) => {
                    warn!("skipping corrupt email packet {}: {}", name, e);
                    false
                }
            };
            if expired && self.packets.delete(&name)? {
                self.quota.release(bytes.len() as u64);
                removed += 1;
            }
        }

        let mut records = 0;
        for name in self.deletions.list()? {
            let Some(bytes) = self.deletions.get(&name)? else {
                continue;
            };
            let Ok(key) = Hash::from_base64(&name) else {
                continue;
            };
            match decode_deletion(&name, key, &bytes) {
                Ok(record) if record.store_time < cutoff => {
                    self.deletions.delete(&name)?;
                    records += 1;
                }
                Ok(_) => {}
                Err(e) => warn!("{}", e),
            }
        }

        if removed > 0 || records > 0 {
            info!(
                "expired {} email packets and {} deletion records",
                removed, records
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folder::{FileFolder, MemoryFolder};
    use bote_crypto::CryptoId;
    use tempfile::TempDir;

    fn memory_store(max: u64) -> EmailPacketStore {
        EmailPacketStore::open(
            Box::new(MemoryFolder::new()),
            Box::new(MemoryFolder::new()),
            Arc::new(StorageQuota::new(max)),
        )
        .unwrap()
    }

    fn packet(payload: &[u8]) -> (EncryptedEmailPacket, UniqueId) {
        let auth = UniqueId::random();
        let packet =
            EncryptedEmailPacket::from_payload(payload.to_vec(), auth.hash(), CryptoId::Ecdh256Ecdsa256)
                .unwrap();
        (packet, auth)
    }

    #[test]
    fn test_store_and_get() {
        let store = memory_store(u64::MAX);
        let (p, _) = packet(b"payload");
        assert!(store.store_at(p.clone(), 500).unwrap());
        assert!(!store.store_at(p.clone(), 600).unwrap());

        let stored = store.get(&p.dht_key()).unwrap().unwrap();
        assert_eq!(stored.store_time(), 500);
        assert_eq!(stored.encrypted_payload(), p.encrypted_payload());
        assert_eq!(store.keys().unwrap(), vec![p.dht_key()]);
    }

    #[test]
    fn test_rejects_wrong_dht_key() {
        let store = memory_store(u64::MAX);
        let (p, _) = packet(b"payload");
        let mut bytes = p.to_bytes().unwrap();
        bytes[2] ^= 0xFF;
        let forged = EncryptedEmailPacket::from_bytes(&bytes).unwrap();
        assert!(matches!(store.store(forged), Err(DhtError::InvalidDhtKey { .. })));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_delete_with_correct_authorization() {
        let store = memory_store(u64::MAX);
        let (a, auth_a) = packet(b"a");
        let (b, _) = packet(b"b");
        store.store(a.clone()).unwrap();
        store.store(b.clone()).unwrap();

        let request = EmailPacketDeleteRequest::new(a.dht_key(), auth_a);
        assert!(store.process_delete_request(&request).unwrap());
        assert!(!store.contains(&a.dht_key()).unwrap());
        assert!(store.contains(&b.dht_key()).unwrap());

        let record = store.deletion_record(&a.dht_key()).unwrap().unwrap();
        assert_eq!(record.delete_authorization, auth_a);
        let info = store.deletion_info(&a.dht_key()).unwrap().unwrap();
        assert!(info.contains(&a.dht_key()));
        assert!(store.deletion_info(&b.dht_key()).unwrap().is_none());
    }

    #[test]
    fn test_delete_with_wrong_authorization_is_silent() {
        let store = memory_store(u64::MAX);
        let (a, _) = packet(b"a");
        store.store(a.clone()).unwrap();

        let request = EmailPacketDeleteRequest::new(a.dht_key(), UniqueId::random());
        assert!(!store.process_delete_request(&request).unwrap());
        assert!(store.contains(&a.dht_key()).unwrap());
        assert!(store.deletion_record(&a.dht_key()).unwrap().is_none());
    }

    #[test]
    fn test_deleted_packet_not_restored() {
        let store = memory_store(u64::MAX);
        let (a, auth) = packet(b"a");
        store.store(a.clone()).unwrap();
        store.delete_at(&a.dht_key(), &auth, 10).unwrap();
        assert!(matches!(store.store(a), Err(DhtError::AlreadyDeleted(_))));
    }

    #[test]
    fn test_apply_forged_deletion_info() {
        let store = memory_store(u64::MAX);
        let (a, auth) = packet(b"a");
        store.store(a.clone()).unwrap();

        let forged = DeletionInfoPacket::new(vec![DeletionRecord {
            dht_key: a.dht_key(),
            delete_authorization: UniqueId::random(),
            store_time: 1,
        }]);
        assert_eq!(store.apply_deletion_info(&forged).unwrap(), 0);

        let genuine = DeletionInfoPacket::new(vec![DeletionRecord {
            dht_key: a.dht_key(),
            delete_authorization: auth,
            store_time: 1,
        }]);
        assert_eq!(store.apply_deletion_info(&genuine).unwrap(), 1);
        assert!(!store.contains(&a.dht_key()).unwrap());
    }

    #[test]
    fn test_quota() {
        let (a, auth) = packet(&[1; 100]);
        let size = a.to_bytes().unwrap().len() as u64;
        let store = memory_store(size + 10);
        store.store(a.clone()).unwrap();

        let (b, _) = packet(&[2; 100]);
        assert!(matches!(store.store(b.clone()), Err(DhtError::StorageFull { .. })));

        store.delete_at(&a.dht_key(), &auth, 0).unwrap();
        assert!(store.store(b).unwrap());
    }

    #[test]
    fn test_delete_expired() {
        let store = memory_store(u64::MAX).with_retention(100);
        let (old, _) = packet(b"old");
        let (edge, _) = packet(b"edge");
        let (new, _) = packet(b"new");
        store.store_at(old.clone(), 100).unwrap();
        store.store_at(edge.clone(), 900).unwrap();
        store.store_at(new.clone(), 950).unwrap();

        let (gone, gone_auth) = packet(b"gone");
        store.store_at(gone.clone(), 100).unwrap();
        store.delete_at(&gone.dht_key(), &gone_auth, 100).unwrap();

        assert_eq!(store.delete_expired_at(1000).unwrap(), 1);
        assert!(!store.contains(&old.dht_key()).unwrap());
        assert!(store.contains(&edge.dht_key()).unwrap());
        assert!(store.contains(&new.dht_key()).unwrap());
        assert!(store.deletion_record(&gone.dht_key()).unwrap().is_none());
        assert_eq!(store.delete_expired_at(1000).unwrap(), 0);

        // expired without a deletion record, so it may be stored again
        assert!(store.store_at(old, 1000).unwrap());
    }

    #[test]
    fn test_reopen_charges_existing_packets() {
        let dir = TempDir::new().unwrap();
        let (a, _) = packet(&[3; 64]);
        let size = a.to_bytes().unwrap().len() as u64;
        {
            let store = EmailPacketStore::open(
                Box::new(FileFolder::open(dir.path().join("packets")).unwrap()),
                Box::new(FileFolder::open(dir.path().join("deleted")).unwrap()),
                Arc::new(StorageQuota::unlimited()),
            )
            .unwrap();
            store.store(a.clone()).unwrap();
        }

        let quota = Arc::new(StorageQuota::unlimited());
        let store = EmailPacketStore::open(
            Box::new(FileFolder::open(dir.path().join("packets")).unwrap()),
            Box::new(FileFolder::open(dir.path().join("deleted")).unwrap()),
            quota.clone(),
        )
        .unwrap();
        assert_eq!(quota.used(), size);
        assert!(store.get(&a.dht_key()).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let packets = Arc::new(MemoryFolder::new());
        let store = EmailPacketStore::open(
            Box::new(packets.clone()),
            Box::new(MemoryFolder::new()),
            Arc::new(StorageQuota::unlimited()),
        )
        .unwrap();
        let key = Hash::digest(b"junk");
        packets.put(&key.to_base64(), b"not a packet").unwrap();
        assert!(store.get(&key).unwrap().is_none());
        assert_eq!(store.delete_expired_at(u32::MAX).unwrap(), 0);
    }
}
