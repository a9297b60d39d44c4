//! Reading content back out of a blockstore
//!
//! [`ChunkReader`] walks a file or metadata DAG depth-first, left to right,
//! fetching one node at a time and yielding chunk payloads in content order.
//! Every fetched block is checked against its CID. [`export`] then reverses
//! whatever transforms the head node records.

use std::io::Write;

use autodag_core::address;
use autodag_core::blockstore::Blockstore;
use autodag_core::codec::DagNode;
use autodag_core::error::{AutoDagError, Result};
use autodag_core::payload::NodeKind;
use autodag_core::stream::{collect_bytes, ByteSourceExt, ByteStream};
use autodag_core::transform::{self, EncryptionKey};
use bytes::Bytes;
use cid::Cid;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Lazy depth-first reader of chunk payloads
pub struct ChunkReader<'s, S: ?Sized> {
    store: &'s S,
    stack: Vec<Cid>,
}

/// Read the stored chunk payloads under `head`, in order
pub fn read_chunks<S: Blockstore + ?Sized>(store: &S, head: Cid) -> ChunkReader<'_, S> {
    ChunkReader {
        store,
        stack: vec![head],
    }
}

impl<'s, S: Blockstore + ?Sized> ChunkReader<'s, S> {
    fn fetch(&self, cid: &Cid) -> Result<DagNode> {
        let bytes = self.store.get(cid)?;
        if !address::verify(cid, &bytes) {
            return Err(AutoDagError::MalformedNode(format!(
                "block {} does not match its address",
                cid
            )));
        }
        DagNode::decode(&bytes)
    }

    /// Visit one node; leaves yield their payload, interior nodes queue
    /// their children
    fn visit(&mut self, cid: Cid) -> Result<Option<Bytes>> {
        let node = self.fetch(&cid)?;
        if node.is_leaf() {
            let payload = node.payload()?;
            return Ok(Some(payload.content()?.clone()));
        }
        self.stack.extend(node.links.iter().rev().map(|l| l.cid));
        Ok(None)
    }
}

impl<'s, S: Blockstore + ?Sized> Iterator for ChunkReader<'s, S> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(cid) = self.stack.pop() {
            match self.visit(cid) {
                Ok(Some(data)) => return Some(Ok(data)),
                Ok(None) => continue,
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Content under `head` with recorded transforms reversed
///
/// `key` is required when the content was encrypted.
pub fn export<'s, S>(store: &'s S, head: Cid, key: Option<&EncryptionKey>) -> Result<ByteStream<'s>>
where
    S: Blockstore + ?Sized,
{
    let root = DagNode::decode(&store.get(&head)?)?;
    let payload = root.payload()?;
    let node_type = payload.kind()?;
    if let NodeKind::Folder = node_type.kind() {
        return Err(AutoDagError::InvalidConfig(format!(
            "{} is a folder and has no content stream",
            head
        )));
    }
    debug!(cid = %head, size = payload.size, ?node_type, "Exporting DAG");

    let reader = read_chunks(store, head);
    match payload.upload_options {
        Some(options) => Ok(Box::new(reader.through(transform::reverse(&options, key)?))),
        None => Ok(Box::new(reader)),
    }
}

/// Export into one buffer
pub fn export_to_bytes<S>(store: &S, head: Cid, key: Option<&EncryptionKey>) -> Result<Bytes>
where
    S: Blockstore + ?Sized,
{
    collect_bytes(export(store, head, key)?)
}

/// Export into a writer, returning the number of bytes written
pub fn export_to_writer<S, W>(
    store: &S,
    head: Cid,
    key: Option<&EncryptionKey>,
    writer: &mut W,
) -> Result<u64>
where
    S: Blockstore + ?Sized,
    W: Write,
{
    let mut written = 0u64;
    for buffer in export(store, head, key)? {
        let buffer = buffer?;
        writer.write_all(&buffer)?;
        written += buffer.len() as u64;
    }
    writer.flush()?;
    Ok(written)
}

/// Read back a record stored with [`crate::import_metadata`]
pub fn read_metadata<S, T>(store: &S, head: Cid) -> Result<T>
where
    S: Blockstore + ?Sized,
    T: DeserializeOwned,
{
    let root = DagNode::decode(&store.get(&head)?)?;
    if root.node_type()?.kind() != NodeKind::Metadata {
        return Err(AutoDagError::InvalidConfig(format!(
            "{} is not a metadata record",
            head
        )));
    }
    let json = export_to_bytes(store, head, None)?;
    Ok(serde_json::from_slice(&json)?)
}
