use chrono::{DateTime, Utc};

use crate::FactorRow;

/// §4.2 TTL cache entry. Evicted lazily on read once `expires_at` passes.
pub struct CacheEntry {
    pub row: FactorRow,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(row: FactorRow, ttl_secs: i64) -> Self {
        Self { row, expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs) }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
