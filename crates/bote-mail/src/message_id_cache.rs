//! Ids of emails that were already assembled
//!
//! Storage peers may hand out the same fragments again after an outage.
//! The cache lets the receiver recognise those without keeping the email
//! content around. It holds a bounded number of ids, evicting the oldest,
//! and is written out in full after every addition.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use bote_dht::Folder;
use bote_protocol::UniqueId;
use tracing::debug;

use crate::error::{MailError, Result};

pub const DEFAULT_CAPACITY: usize = 1000;

/// Folder entry holding the cache, one base64 id per line
pub const CACHE_ENTRY: &str = "messageIdCache.txt";

pub struct MessageIdCache {
    folder: Box<dyn Folder>,
    capacity: usize,
    ids: Mutex<VecDeque<UniqueId>>,
}

impl MessageIdCache {
    /// Load the cache from `folder`, or start empty
    pub fn open(folder: Box<dyn Folder>, capacity: usize) -> Result<Self> {
        let mut ids = VecDeque::new();
        if let Some(bytes) = folder.get(CACHE_ENTRY)? {
            let text = String::from_utf8(bytes)
                .map_err(|_| MailError::CorruptCache("not UTF-8".to_string()))?;
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let id = UniqueId::from_base64(line).map_err(MailError::CorruptCache)?;
                ids.push_back(id);
            }
        }
        while ids.len() > capacity {
            ids.pop_front();
        }
        debug!("loaded {} message ids", ids.len());

        Ok(MessageIdCache {
            folder,
            capacity,
            ids: Mutex::new(ids),
        })
    }

    fn ids(&self) -> MutexGuard<'_, VecDeque<UniqueId>> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, id: &UniqueId) -> bool {
        self.ids().contains(id)
    }

    /// Add an id and persist the cache; returns `false` if it was present
    pub fn add(&self, id: UniqueId) -> Result<bool> {
        let mut ids = self.ids();
        if ids.contains(&id) {
            return Ok(false);
        }
        ids.push_back(id);
        while ids.len() > self.capacity {
            ids.pop_front();
        }

        let mut text = String::with_capacity(ids.len() * 45);
        for id in ids.iter() {
            text.push_str(&id.to_base64());
            text.push('\n');
        }
        self.folder.put(CACHE_ENTRY, text.as_bytes())?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bote_dht::{FileFolder, MemoryFolder};
    use tempfile::TempDir;

    #[test]
    fn test_add_and_contains() {
        let cache = MessageIdCache::open(Box::new(MemoryFolder::new()), 10).unwrap();
        let id = UniqueId::random();
        assert!(!cache.contains(&id));
        assert!(cache.add(id).unwrap());
        assert!(!cache.add(id).unwrap());
        assert!(cache.contains(&id));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_oldest() {
        let cache = MessageIdCache::open(Box::new(MemoryFolder::new()), 3).unwrap();
        let ids: Vec<_> = (0..4).map(|_| UniqueId::random()).collect();
        for id in &ids {
            cache.add(*id).unwrap();
        }
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&ids[0]));
        assert!(ids[1..].iter().all(|id| cache.contains(id)));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let ids: Vec<_> = (0..5).map(|_| UniqueId::random()).collect();
        {
            let cache = MessageIdCache::open(Box::new(FileFolder::open(dir.path()).unwrap()), 100).unwrap();
            for id in &ids {
                cache.add(*id).unwrap();
            }
        }
        let text = std::fs::read_to_string(dir.path().join(CACHE_ENTRY)).unwrap();
        assert_eq!(text.lines().count(), 5);

        let cache = MessageIdCache::open(Box::new(FileFolder::open(dir.path()).unwrap()), 3).unwrap();
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&ids[4]));
        assert!(!cache.contains(&ids[0]));
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let folder = MemoryFolder::new();
        folder.put(CACHE_ENTRY, b"not base64 at all!\n").unwrap();
        assert!(matches!(
            MessageIdCache::open(Box::new(folder), 10),
            Err(MailError::CorruptCache(_))
        ));
    }
}
