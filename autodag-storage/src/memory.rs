//! In-memory blockstore
//!
//! Used for testing and development. Not persistent.

use crate::backend::{StatsSource, StorageStats};
use autodag_core::blockstore::{Blockstore, CidIter};
use autodag_core::codec::node_type_of;
use autodag_core::error::{AutoDagError, Result};
use autodag_core::payload::NodeType;
use bytes::Bytes;
use cid::Cid;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

#[derive(Default)]
struct Inner {
    blocks: HashMap<Cid, Bytes>,
    by_type: HashMap<NodeType, BTreeSet<Cid>>,
}

/// In-memory blockstore
pub struct MemoryBlockstore {
    inner: RwLock<Inner>,

    /// Maximum capacity (0 = unlimited)
    max_capacity: u64,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBlockstore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with a maximum capacity
    pub fn with_capacity(max_bytes: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_capacity: max_bytes,
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Number of stored blocks
    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored blocks
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.blocks.clear();
        inner.by_type.clear();
        self.bytes_used.store(0, Ordering::SeqCst);
    }
}

impl Default for MemoryBlockstore {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockstore for MemoryBlockstore {
    fn put(&self, cid: Cid, bytes: Bytes) -> Result<()> {
        let node_type = node_type_of(&bytes)?;
        let len = bytes.len() as u64;

        let mut inner = self.inner.write();
        if let Some(existing) = inner.blocks.get(&cid) {
            if *existing != bytes {
                return Err(AutoDagError::HashCollision(cid));
            }
            trace!(cid = %cid, "Block already present");
            return Ok(());
        }

        // Check capacity
        if self.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst);
            if current + len > self.max_capacity {
                return Err(AutoDagError::StorageFull {
                    used: current,
                    capacity: self.max_capacity,
                });
            }
        }

        inner.blocks.insert(cid, bytes);
        inner.by_type.entry(node_type).or_default().insert(cid);
        self.bytes_used.fetch_add(len, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get(&self, cid: &Cid) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner
            .read()
            .blocks
            .get(cid)
            .cloned()
            .ok_or(AutoDagError::NotFound(*cid))
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.inner.read().blocks.contains_key(cid))
    }

    fn delete(&self, cid: &Cid) -> Result<bool> {
        let mut inner = self.inner.write();

        let Some(old) = inner.blocks.remove(cid) else {
            return Ok(false);
        };
        if let Ok(node_type) = node_type_of(&old) {
            if let Some(set) = inner.by_type.get_mut(&node_type) {
                set.remove(cid);
            }
        }
        self.bytes_used.fetch_sub(old.len() as u64, Ordering::SeqCst);
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn size(&self, cid: &Cid) -> Result<u64> {
        self.inner
            .read()
            .blocks
            .get(cid)
            .map(|b| b.len() as u64)
            .ok_or(AutoDagError::NotFound(*cid))
    }

    /// Snapshot of the matching CIDs at call time
    fn iter_filtered(&self, node_type: NodeType) -> Result<CidIter<'_>> {
        let cids: Vec<Cid> = self
            .inner
            .read()
            .by_type
            .get(&node_type)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        Ok(Box::new(cids.into_iter().map(Ok)))
    }
}

impl StatsSource for MemoryBlockstore {
    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            block_count: self.inner.read().blocks.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }
}
