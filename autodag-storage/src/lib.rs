//! AutoDAG Storage
//!
//! Blockstore backends and the import/export drivers:
//! - `MemoryBlockstore` for testing
//! - `SledBlockstore` for persistent block storage
//! - `importer` streams content through transforms and assembly into a store
//! - `exporter` reads a DAG back out of a store and reverses the transforms

pub mod backend;
pub mod exporter;
pub mod importer;
pub mod memory;
pub mod sled_backend;

pub use backend::{StatsSource, StorageStats};
pub use exporter::{export, export_to_bytes, export_to_writer, read_chunks, read_metadata, ChunkReader};
pub use importer::{
    import, import_file, import_folder, import_metadata, import_stream, ImportOptions,
    ImportResult,
};
pub use memory::MemoryBlockstore;
pub use sled_backend::SledBlockstore;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to storage directory
    pub path: std::path::PathBuf,

    /// Maximum storage capacity in bytes (0 = unlimited)
    pub max_capacity: u64,

    /// Flush to disk after every block write
    pub flush_every_write: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: std::path::PathBuf::from("./autodag_data"),
            max_capacity: 0, // Unlimited
            flush_every_write: false,
        }
    }
}

impl StorageConfig {
    /// Create a new storage config with the given path
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set maximum capacity
    pub fn with_max_capacity(mut self, bytes: u64) -> Self {
        self.max_capacity = bytes;
        self
    }

    /// Enable/disable flushing after every write
    pub fn with_flush_every_write(mut self, enabled: bool) -> Self {
        self.flush_every_write = enabled;
        self
    }
}
