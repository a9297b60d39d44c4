//! Blockstore contract
//!
//! The only boundary between the DAG core and a concrete storage backend.
//! Blocks are keyed by CID and written once: putting the same bytes again is
//! a no-op, putting different bytes under a used CID is a hash collision.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use cid::Cid;

use crate::error::Result;
use crate::payload::{NodeKind, NodeType};

/// Lazy sequence of CIDs returned by filtered iteration
pub type CidIter<'a> = Box<dyn Iterator<Item = Result<Cid>> + Send + 'a>;

/// Synchronous content-addressed block storage
///
/// Implementations must be safe to call concurrently; concurrent puts of the
/// same CID carry identical bytes and must not fail.
pub trait Blockstore: Send + Sync {
    /// Store a block
    fn put(&self, cid: Cid, bytes: Bytes) -> Result<()>;

    /// Retrieve a block, failing with `NotFound` on a miss
    fn get(&self, cid: &Cid) -> Result<Bytes>;

    /// Check if a block exists
    fn has(&self, cid: &Cid) -> Result<bool>;

    /// Delete a block, returning whether it existed
    fn delete(&self, cid: &Cid) -> Result<bool>;

    /// Byte length of a stored block without fetching it
    fn size(&self, cid: &Cid) -> Result<u64>;

    /// CIDs of all stored nodes of the given type
    fn iter_filtered(&self, node_type: NodeType) -> Result<CidIter<'_>>;

    /// CIDs of all stored nodes of the given kind
    fn iter_kind(&self, kind: NodeKind) -> Result<CidIter<'_>> {
        let mut iters = Vec::new();
        for node_type in kind.node_types() {
            iters.push(self.iter_filtered(node_type)?);
        }
        Ok(Box::new(iters.into_iter().flatten()))
    }

    /// Flush pending writes
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: Blockstore + ?Sized> Blockstore for &T {
    fn put(&self, cid: Cid, bytes: Bytes) -> Result<()> {
        (**self).put(cid, bytes)
    }

    fn get(&self, cid: &Cid) -> Result<Bytes> {
        (**self).get(cid)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        (**self).has(cid)
    }

    fn delete(&self, cid: &Cid) -> Result<bool> {
        (**self).delete(cid)
    }

    fn size(&self, cid: &Cid) -> Result<u64> {
        (**self).size(cid)
    }

    fn iter_filtered(&self, node_type: NodeType) -> Result<CidIter<'_>> {
        (**self).iter_filtered(node_type)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// Boxed future returned by [`AsyncBlockstore`] methods
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Async block storage, awaited by the streaming importer
pub trait AsyncBlockstore: Send + Sync {
    /// Store a block
    fn put<'a>(&'a self, cid: Cid, bytes: Bytes) -> BoxFuture<'a, ()>;

    /// Retrieve a block
    fn get<'a>(&'a self, cid: Cid) -> BoxFuture<'a, Bytes>;

    /// Check if a block exists
    fn has<'a>(&'a self, cid: Cid) -> BoxFuture<'a, bool>;

    /// Delete a block
    fn delete<'a>(&'a self, cid: Cid) -> BoxFuture<'a, bool>;

    /// Byte length of a stored block
    fn size<'a>(&'a self, cid: Cid) -> BoxFuture<'a, u64>;

    /// CIDs of all stored nodes of the given type
    fn iter_filtered<'a>(&'a self, node_type: NodeType) -> BoxFuture<'a, CidIter<'a>>;

    /// CIDs of all stored nodes of the given kind
    fn iter_kind<'a>(&'a self, kind: NodeKind) -> BoxFuture<'a, CidIter<'a>> {
        let node_types: Vec<NodeType> = kind.node_types().collect();
        Box::pin(async move {
            let mut iters = Vec::with_capacity(node_types.len());
            for node_type in node_types {
                iters.push(self.iter_filtered(node_type).await?);
            }
            Ok(Box::new(iters.into_iter().flatten()) as CidIter<'a>)
        })
    }

    /// Flush pending writes
    fn flush<'a>(&'a self) -> BoxFuture<'a, ()>;
}

/// Wrapper to expose a sync store through the async interface
pub struct AsyncWrapper<T: Blockstore>(pub T);

impl<T: Blockstore> AsyncWrapper<T> {
    pub fn inner(&self) -> &T {
        &self.0
    }
}

impl<T: Blockstore + 'static> AsyncBlockstore for AsyncWrapper<T> {
    fn put<'a>(&'a self, cid: Cid, bytes: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.0.put(cid, bytes) })
    }

    fn get<'a>(&'a self, cid: Cid) -> BoxFuture<'a, Bytes> {
        Box::pin(async move { self.0.get(&cid) })
    }

    fn has<'a>(&'a self, cid: Cid) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.0.has(&cid) })
    }

    fn delete<'a>(&'a self, cid: Cid) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.0.delete(&cid) })
    }

    fn size<'a>(&'a self, cid: Cid) -> BoxFuture<'a, u64> {
        Box::pin(async move { self.0.size(&cid) })
    }

    fn iter_filtered<'a>(&'a self, node_type: NodeType) -> BoxFuture<'a, CidIter<'a>> {
        Box::pin(async move { self.0.iter_filtered(node_type) })
    }

    fn flush<'a>(&'a self) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.0.flush() })
    }
}
