//! Retention window and the periodic sweep contract

use crate::error::Result;

/// Default retention for stored packets and index entries (100 days)
pub const EXPIRATION_TIME_SECS: u32 = 100 * 24 * 60 * 60;

/// Storage that drops entries older than a retention window
pub trait Expirable: Send + Sync {
    /// Remove everything stored before `now - retention`; returns the number
    /// of packets or entries removed. Running it twice is a no-op the
    /// second time.
    fn delete_expired_at(&self, now: u32) -> Result<usize>;

    fn delete_expired(&self) -> Result<usize> {
        self.delete_expired_at(bote_protocol::now())
    }
}

/// Oldest store time that is still retained
pub fn cutoff(now: u32, retention_secs: u32) -> u32 {
    now.saturating_sub(retention_secs)
}
