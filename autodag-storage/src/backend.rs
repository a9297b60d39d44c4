//! Storage statistics shared by the blockstore backends

use autodag_core::error::Result;

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of blocks stored
    pub block_count: u64,

    /// Total bytes used by blocks
    pub bytes_used: u64,

    /// Total storage capacity (0 = unlimited)
    pub bytes_capacity: u64,

    /// Number of read operations
    pub reads: u64,

    /// Number of write operations (idempotent re-puts excluded)
    pub writes: u64,

    /// Number of delete operations
    pub deletes: u64,
}

impl StorageStats {
    /// Calculate usage percentage
    pub fn usage_percent(&self) -> f64 {
        if self.bytes_capacity == 0 {
            0.0
        } else {
            (self.bytes_used as f64 / self.bytes_capacity as f64) * 100.0
        }
    }

    /// Check if storage is full
    pub fn is_full(&self) -> bool {
        self.bytes_capacity > 0 && self.bytes_used >= self.bytes_capacity
    }

    /// Available space in bytes
    pub fn bytes_available(&self) -> u64 {
        if self.bytes_capacity == 0 {
            u64::MAX
        } else {
            self.bytes_capacity.saturating_sub(self.bytes_used)
        }
    }

    /// Whether `len` more bytes fit
    pub fn fits(&self, len: u64) -> bool {
        self.bytes_capacity == 0 || self.bytes_used.saturating_add(len) <= self.bytes_capacity
    }
}

/// Backends that keep usage counters
pub trait StatsSource {
    fn stats(&self) -> Result<StorageStats>;
}
