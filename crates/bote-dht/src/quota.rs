//! Byte budget shared by the packet stores

use std::sync::Mutex;

use crate::error::{DhtError, Result};

/// Tracks bytes used on disk against a fixed maximum
#[derive(Debug)]
pub struct StorageQuota {
    max: u64,
    used: Mutex<u64>,
}

impl StorageQuota {
    pub fn new(max: u64) -> Self {
        StorageQuota {
            max,
            used: Mutex::new(0),
        }
    }

    /// Effectively unlimited
    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn used(&self) -> u64 {
        *self.lock()
    }

    /// Reserve `bytes`, failing with [`DhtError::StorageFull`] if they don't fit
    pub fn reserve(&self, bytes: u64) -> Result<()> {
        let mut used = self.lock();
        match used.checked_add(bytes) {
            Some(total) if total <= self.max => {
                *used = total;
                Ok(())
            }
            _ => Err(DhtError::StorageFull { max: self.max }),
        }
    }

    /// Account for bytes already on disk, ignoring the limit
    pub fn charge(&self, bytes: u64) {
        let mut used = self.lock();
        *used = used.saturating_add(bytes);
    }

    pub fn release(&self, bytes: u64) {
        let mut used = self.lock();
        *used = used.saturating_sub(bytes);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        self.used.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let quota = StorageQuota::new(100);
        quota.reserve(60).unwrap();
        assert!(matches!(quota.reserve(41), Err(DhtError::StorageFull { max: 100 })));
        quota.reserve(40).unwrap();
        assert_eq!(quota.used(), 100);
        quota.release(30);
        assert_eq!(quota.used(), 70);
        quota.release(1000);
        assert_eq!(quota.used(), 0);
    }

    #[test]
    fn test_charge_ignores_limit() {
        let quota = StorageQuota::new(10);
        quota.charge(50);
        assert_eq!(quota.used(), 50);
        assert!(quota.reserve(1).is_err());
    }

    #[test]
    fn test_unlimited_does_not_overflow() {
        let quota = StorageQuota::unlimited();
        quota.charge(u64::MAX);
        assert!(quota.reserve(1).is_err());
    }
}
