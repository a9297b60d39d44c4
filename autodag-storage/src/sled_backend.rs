//! Sled-based blockstore
//!
//! Blocks live in three trees:
//! - `blocks`: CID bytes to encoded node
//! - `sizes`: CID bytes to block length (little-endian u64)
//! - `types`: node type tag followed by CID bytes, empty value
//!
//! A put or delete touches all three trees in one transaction, so a block is
//! never visible without its size and type entries. Filtered iteration is a
//! lazy prefix scan over `types`.

use crate::backend::{StatsSource, StorageStats};
use crate::StorageConfig;
use autodag_core::address;
use autodag_core::blockstore::{Blockstore, CidIter};
use autodag_core::codec::node_type_of;
use autodag_core::error::{AutoDagError, Result};
use autodag_core::payload::NodeType;
use bytes::Bytes;
use cid::Cid;
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::Transactional;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace};

const BLOCKS_TREE: &str = "blocks";
const SIZES_TREE: &str = "sizes";
const TYPES_TREE: &str = "types";

fn storage_error(e: sled::Error) -> AutoDagError {
    AutoDagError::Storage(e.to_string())
}

fn transaction_error(e: TransactionError<Infallible>) -> AutoDagError {
    match e {
        TransactionError::Storage(e) => storage_error(e),
        TransactionError::Abort(never) => match never {},
    }
}

/// What a put transaction found under the CID
enum PutOutcome {
    Stored,
    Present,
    Collision,
}

fn type_key(node_type: NodeType, cid: &Cid) -> Vec<u8> {
    let cid_bytes = cid.to_bytes();
    let mut key = Vec::with_capacity(1 + cid_bytes.len());
    key.push(node_type.tag());
    key.extend_from_slice(&cid_bytes);
    key
}

/// Sled-backed blockstore
pub struct SledBlockstore {
    db: sled::Db,
    blocks: sled::Tree,
    sizes: sled::Tree,
    types: sled::Tree,
    max_capacity: u64,
    flush_every_write: bool,

    bytes_used: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl SledBlockstore {
    /// Open or create a blockstore at `config.path`
    pub fn open(config: StorageConfig) -> Result<Self> {
        info!(path = ?config.path, "Opening Sled blockstore");

        let db = sled::open(&config.path)
            .map_err(|e| AutoDagError::Storage(format!("Failed to open Sled: {}", e)))?;
        Self::from_db(db, &config)
    }

    /// Open an in-memory store (for testing)
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| AutoDagError::Storage(format!("Failed to open Sled: {}", e)))?;
        Self::from_db(db, &StorageConfig::default())
    }

    fn from_db(db: sled::Db, config: &StorageConfig) -> Result<Self> {
        let blocks = db.open_tree(BLOCKS_TREE).map_err(storage_error)?;
        let sizes = db.open_tree(SIZES_TREE).map_err(storage_error)?;
        let types = db.open_tree(TYPES_TREE).map_err(storage_error)?;

        let mut used = 0u64;
        for entry in sizes.iter() {
            let (_, value) = entry.map_err(storage_error)?;
            used += decode_size(&value)?;
        }
        debug!(blocks = blocks.len(), bytes = used, "Sled blockstore ready");

        Ok(Self {
            db,
            blocks,
            sizes,
            types,
            max_capacity: config.max_capacity,
            flush_every_write: config.flush_every_write,
            bytes_used: AtomicU64::new(used),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Get database size on disk
    pub fn size_on_disk(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    /// Number of stored blocks
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn decode_size(value: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| AutoDagError::Storage("corrupt size entry".to_string()))?;
    Ok(u64::from_le_bytes(bytes))
}

impl Blockstore for SledBlockstore {
    fn put(&self, cid: Cid, bytes: Bytes) -> Result<()> {
        let node_type = node_type_of(&bytes)?;
        let len = bytes.len() as u64;
        let key = cid.to_bytes();

        if self.max_capacity > 0 && !self.blocks.contains_key(&key).map_err(storage_error)? {
            let current = self.bytes_used.load(Ordering::SeqCst);
            if current + len > self.max_capacity {
                return Err(AutoDagError::StorageFull {
                    used: current,
                    capacity: self.max_capacity,
                });
            }
        }

        let index_key = type_key(node_type, &cid);
        let outcome = (&self.blocks, &self.sizes, &self.types)
            .transaction(
                |(blocks, sizes, types)| -> ConflictableTransactionResult<PutOutcome, Infallible> {
                    if let Some(current) = blocks.get(key.as_slice())? {
                        if current.as_ref() == bytes.as_ref() {
                            return Ok(PutOutcome::Present);
                        }
                        return Ok(PutOutcome::Collision);
                    }
                    blocks.insert(key.as_slice(), bytes.as_ref())?;
                    sizes.insert(key.as_slice(), &len.to_le_bytes()[..])?;
                    types.insert(index_key.as_slice(), &[] as &[u8])?;
                    Ok(PutOutcome::Stored)
                },
            )
            .map_err(transaction_error)?;

        match outcome {
            PutOutcome::Stored => {}
            PutOutcome::Present => {
                trace!(cid = %cid, "Block already present");
                return Ok(());
            }
            PutOutcome::Collision => return Err(AutoDagError::HashCollision(cid)),
        }
        self.bytes_used.fetch_add(len, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        if self.flush_every_write {
            self.db.flush().map_err(storage_error)?;
        }
        trace!(cid = %cid, size = len, "Stored block");
        Ok(())
    }

    fn get(&self, cid: &Cid) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        match self.blocks.get(cid.to_bytes()).map_err(storage_error)? {
            Some(value) => Ok(Bytes::copy_from_slice(&value)),
            None => Err(AutoDagError::NotFound(*cid)),
        }
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        self.blocks
            .contains_key(cid.to_bytes())
            .map_err(storage_error)
    }

    fn delete(&self, cid: &Cid) -> Result<bool> {
        let key = cid.to_bytes();
        let removed = (&self.blocks, &self.sizes, &self.types)
            .transaction(
                |(blocks, sizes, types)| -> ConflictableTransactionResult<Option<u64>, Infallible> {
                    let Some(old) = blocks.remove(key.as_slice())? else {
                        return Ok(None);
                    };
                    sizes.remove(key.as_slice())?;
                    if let Ok(node_type) = node_type_of(&old) {
                        types.remove(type_key(node_type, cid))?;
                    }
                    Ok(Some(old.len() as u64))
                },
            )
            .map_err(transaction_error)?;
        let Some(len) = removed else {
            return Ok(false);
        };

        self.bytes_used.fetch_sub(len, Ordering::SeqCst);
        self.deletes.fetch_add(1, Ordering::Relaxed);
        debug!(cid = %cid, "Deleted block");
        Ok(true)
    }

    fn size(&self, cid: &Cid) -> Result<u64> {
        match self.sizes.get(cid.to_bytes()).map_err(storage_error)? {
            Some(value) => decode_size(&value),
            None => Err(AutoDagError::NotFound(*cid)),
        }
    }

    fn iter_filtered(&self, node_type: NodeType) -> Result<CidIter<'_>> {
        let iter = self.types.scan_prefix([node_type.tag()]).map(|entry| {
            let (key, _) = entry.map_err(storage_error)?;
            address::from_bytes(&key[1..])
        });
        Ok(Box::new(iter))
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_error)?;
        Ok(())
    }
}

impl StatsSource for SledBlockstore {
    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            block_count: self.blocks.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodag_core::{Builders, FileBuilders, MetadataBuilders};
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn chunk(data: &'static [u8]) -> (Cid, Bytes) {
        let node = FileBuilders.chunk(Bytes::from_static(data));
        (node.cid(), node.encode())
    }

    #[test]
    fn test_put_get_delete() {
        let store = SledBlockstore::open_temporary().unwrap();
        let (cid, bytes) = chunk(b"sled block");

        store.put(cid, bytes.clone()).unwrap();
        assert_eq!(store.get(&cid).unwrap(), bytes);
        assert_eq!(store.size(&cid).unwrap(), bytes.len() as u64);
        assert!(store.has(&cid).unwrap());

        assert!(store.delete(&cid).unwrap());
        assert!(!store.has(&cid).unwrap());
        assert!(matches!(store.size(&cid), Err(AutoDagError::NotFound(_))));
        assert!(!store.delete(&cid).unwrap());
    }

    #[test]
    fn test_idempotent_and_collision() {
        let store = SledBlockstore::open_temporary().unwrap();
        let (cid, bytes) = chunk(b"one");
        let (_, other) = chunk(b"two");

        store.put(cid, bytes.clone()).unwrap();
        store.put(cid, bytes).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().unwrap().writes, 1);

        assert!(matches!(
            store.put(cid, other),
            Err(AutoDagError::HashCollision(_))
        ));
    }

    #[test]
    fn test_concurrent_same_block_puts_are_indexed() {
        let store = SledBlockstore::open_temporary().unwrap();
        let barrier = Barrier::new(2);

        for round in 0..200u32 {
            let node = FileBuilders.chunk(Bytes::from(format!("round {}", round)));
            let (cid, bytes) = (node.cid(), node.encode());

            std::thread::scope(|scope| {
                for _ in 0..2 {
                    scope.spawn(|| {
                        barrier.wait();
                        store.put(cid, bytes.clone()).unwrap();
                        // visible with its index as soon as put returns
                        assert_eq!(store.size(&cid).unwrap(), bytes.len() as u64);
                        assert!(store
                            .iter_filtered(NodeType::FileChunk)
                            .unwrap()
                            .any(|c| c.unwrap() == cid));
                    });
                }
            });
        }

        let stats = store.stats().unwrap();
        assert_eq!(stats.block_count, 200);
        assert_eq!(stats.writes, 200);
    }

    #[test]
    fn test_delete_clears_index() {
        let store = SledBlockstore::open_temporary().unwrap();
        let (cid, bytes) = chunk(b"short lived");
        store.put(cid, bytes).unwrap();
        assert!(store.delete(&cid).unwrap());

        assert_eq!(store.iter_filtered(NodeType::FileChunk).unwrap().count(), 0);
        assert_eq!(store.stats().unwrap().bytes_used, 0);
    }

    #[test]
    fn test_iter_filtered_by_prefix() {
        let store = SledBlockstore::open_temporary().unwrap();
        let (a, a_bytes) = chunk(b"chunk a");
        let (b, b_bytes) = chunk(b"chunk b");
        let meta = MetadataBuilders.chunk(Bytes::from_static(b"{}"));

        store.put(a, a_bytes).unwrap();
        store.put(b, b_bytes).unwrap();
        store.put(meta.cid(), meta.encode()).unwrap();

        let mut chunks: Vec<Cid> = store
            .iter_filtered(NodeType::FileChunk)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        chunks.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(chunks, expected);

        let metadata: Vec<Cid> = store
            .iter_filtered(NodeType::MetadataChunk)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(metadata, vec![meta.cid()]);
        assert_eq!(store.iter_filtered(NodeType::Folder).unwrap().count(), 0);
    }

    #[test]
    fn test_reopen_keeps_blocks_and_usage() {
        let dir = TempDir::new().unwrap();
        let (cid, bytes) = chunk(b"durable");
        let config = StorageConfig::new(dir.path());

        {
            let store = SledBlockstore::open(config.clone()).unwrap();
            store.put(cid, bytes.clone()).unwrap();
            store.flush().unwrap();
        }

        let store = SledBlockstore::open(config).unwrap();
        assert_eq!(store.get(&cid).unwrap(), bytes);
        assert_eq!(store.stats().unwrap().bytes_used, bytes.len() as u64);
        assert_eq!(store.iter_filtered(NodeType::FileChunk).unwrap().count(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let dir = TempDir::new().unwrap();
        let (a, a_bytes) = chunk(b"aaaa");
        let (b, b_bytes) = chunk(b"bbbb");
        let config = StorageConfig::new(dir.path()).with_max_capacity(a_bytes.len() as u64);
        let store = SledBlockstore::open(config).unwrap();

        store.put(a, a_bytes.clone()).unwrap();
        // re-putting an existing block does not count against capacity
        store.put(a, a_bytes).unwrap();
        assert!(matches!(
            store.put(b, b_bytes),
            Err(AutoDagError::StorageFull { .. })
        ));
    }
}
