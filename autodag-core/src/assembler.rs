//! DAG assembly
//!
//! Chunks flow in one at a time; chunk nodes are emitted as soon as it is
//! clear the content will not fit a single node. The first chunk is held
//! back until a second one arrives (or the stream ends) to make that call.
//! After the stream ends, the level of `{cid, size}` entries is collapsed
//! left to right into inlink nodes until it fits under one root.
//!
//! Blocks come out children-first: chunks, then each inlink level bottom-up,
//! then the root. Nothing is emitted before the options and the first chunk
//! node have been validated.

use bytes::Bytes;
use cid::Cid;
use serde::Serialize;
use tracing::{debug, trace};

use crate::address;
use crate::builders::{check_node_size, folder_inlink, folder_root, Builders, MetadataBuilders};
use crate::codec::{DagNode, Link};
use crate::config::ChunkingOptions;
use crate::error::Result;
use crate::payload::{NodeType, UploadOptions};
use crate::rechunker::rechunk;
use crate::stream::bytes_source;

/// An encoded node together with its address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    pub node: DagNode,
    pub bytes: Bytes,
}

impl Block {
    pub fn new(node: DagNode) -> Self {
        let bytes = node.encode();
        let cid = address::node_cid(&bytes, !node.is_leaf());
        Self { cid, node, bytes }
    }

    pub fn node_type(&self) -> Result<NodeType> {
        self.node.node_type()
    }
}

/// A `{cid, size}` entry of one tree level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEntry {
    pub cid: Cid,
    pub size: u64,
}

/// Incremental DAG builder over a sequence of fixed-size chunks
pub struct DagAssembler<'b> {
    builders: &'b dyn Builders,
    options: ChunkingOptions,
    name: Option<String>,
    upload_options: Option<UploadOptions>,
    held: Option<Bytes>,
    level: Vec<LinkEntry>,
}

impl<'b> DagAssembler<'b> {
    pub fn new(builders: &'b dyn Builders, options: ChunkingOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            builders,
            options,
            name: None,
            upload_options: None,
            held: None,
            level: Vec::new(),
        })
    }

    /// Display name carried by the head node
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Transform record carried by the head node
    pub fn with_upload_options(mut self, options: Option<UploadOptions>) -> Self {
        self.upload_options = options;
        self
    }

    /// Record the pre-transform content length in the upload options, if any
    ///
    /// Drivers call this once the source is drained, before [`Self::finish`].
    pub fn set_source_size(&mut self, size: u64) {
        if let Some(options) = self.upload_options.as_mut() {
            options.source_size = Some(size);
        }
    }

    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    /// Accept the next chunk, returning blocks that are ready to persist
    pub fn push_chunk(&mut self, chunk: Bytes) -> Result<Vec<Block>> {
        if self.held.is_none() && self.level.is_empty() {
            self.held = Some(chunk);
            return Ok(Vec::new());
        }

        let mut blocks = Vec::with_capacity(2);
        if let Some(first) = self.held.take() {
            blocks.push(self.chunk_block(first)?);
        }
        blocks.push(self.chunk_block(chunk)?);
        Ok(blocks)
    }

    /// End of content: build the remaining tree and return the head
    pub fn finish(mut self) -> Result<(Cid, Vec<Block>)> {
        let mut blocks = Vec::new();

        if self.level.is_empty() {
            let data = self.held.take().unwrap_or_default();
            let single = self.builders.single(
                data.clone(),
                self.name.as_deref(),
                self.upload_options.as_ref(),
            );
            if single.encoded_len() <= self.options.max_node_size {
                let block = Block::new(single);
                debug!(cid = %block.cid, size = data.len(), "Assembled single-node DAG");
                return Ok((block.cid, vec![block]));
            }
            // the root's name and options are exempt from the limit, the leaf's are not
            blocks.push(self.chunk_block(data)?);
        }

        let total_size: u64 = self.level.iter().map(|e| e.size).sum();
        let chunk_count = self.level.len();
        let max_links = self.options.max_links_per_node;
        let mut level = std::mem::take(&mut self.level);
        let mut depth = 0u32;

        while level.len() > max_links {
            depth += 1;
            let mut next = Vec::with_capacity(level.len().div_ceil(max_links));
            for group in level.chunks(max_links) {
                let cids: Vec<Cid> = group.iter().map(|e| e.cid).collect();
                let size = group.iter().map(|e| e.size).sum();
                let node =
                    self.builders
                        .inlink(&cids, size, depth, self.options.max_node_size)?;
                let block = Block::new(node);
                trace!(cid = %block.cid, depth, links = cids.len(), "Built inlink node");
                next.push(LinkEntry {
                    cid: block.cid,
                    size,
                });
                blocks.push(block);
            }
            level = next;
        }

        depth += 1;
        let cids: Vec<Cid> = level.iter().map(|e| e.cid).collect();
        let root = self.builders.root(
            &cids,
            total_size,
            depth,
            self.name.as_deref(),
            self.options.max_node_size,
            self.upload_options.as_ref(),
        )?;
        let root = Block::new(root);
        let head = root.cid;
        blocks.push(root);

        debug!(
            cid = %head,
            chunks = chunk_count,
            depth,
            size = total_size,
            "Assembled DAG"
        );
        Ok((head, blocks))
    }

    /// Drive the whole assembly from a byte source, handing every block to
    /// `emit` in children-first order
    pub fn assemble<I, F>(mut self, source: I, mut emit: F) -> Result<Cid>
    where
        I: Iterator<Item = Result<Bytes>>,
        F: FnMut(Block) -> Result<()>,
    {
        for chunk in rechunk(source, self.options.chunk_size)? {
            for block in self.push_chunk(chunk?)? {
                emit(block)?;
            }
        }
        let (head, blocks) = self.finish()?;
        for block in blocks {
            emit(block)?;
        }
        Ok(head)
    }

    fn chunk_block(&mut self, data: Bytes) -> Result<Block> {
        let size = data.len() as u64;
        let node = self.builders.chunk(data);
        check_node_size(&node, self.options.max_node_size)?;
        let block = Block::new(node);
        self.level.push(LinkEntry {
            cid: block.cid,
            size,
        });
        Ok(block)
    }
}

/// Serialize a metadata record as JSON and assemble it with metadata builders
pub fn assemble_metadata<T, F>(
    record: &T,
    name: Option<String>,
    options: ChunkingOptions,
    emit: F,
) -> Result<Cid>
where
    T: Serialize + ?Sized,
    F: FnMut(Block) -> Result<()>,
{
    let json = serde_json::to_vec(record)?;
    let chunk_size = options.chunk_size;
    DagAssembler::new(&MetadataBuilders, options)?
        .with_name(name)
        .assemble(bytes_source(json, chunk_size), emit)
}

/// Assemble a folder node over already-stored children
///
/// Each child link should carry the child's name and total size; the folder
/// size is their sum. Large folders are split into folder inlinks. Every node
/// is built and size-checked before the first one is emitted.
pub fn assemble_folder<F>(
    children: &[Link],
    name: Option<&str>,
    options: ChunkingOptions,
    mut emit: F,
) -> Result<Cid>
where
    F: FnMut(Block) -> Result<()>,
{
    options.validate()?;
    let max_links = options.max_links_per_node;
    let total_size: u64 = children.iter().map(|l| l.size.unwrap_or(0)).sum();

    let mut blocks = Vec::new();
    let mut level: Vec<Link> = children.to_vec();
    let mut depth = 0u32;
    while level.len() > max_links {
        depth += 1;
        let mut next = Vec::with_capacity(level.len().div_ceil(max_links));
        for group in level.chunks(max_links) {
            let size = group.iter().map(|l| l.size.unwrap_or(0)).sum();
            let block = Block::new(folder_inlink(group, size, depth, options.max_node_size)?);
            next.push(Link {
                cid: block.cid,
                name: None,
                size: Some(size),
            });
            blocks.push(block);
        }
        level = next;
    }

    let root = Block::new(folder_root(
        &level,
        total_size,
        depth + 1,
        name,
        options.max_node_size,
    )?);
    let head = root.cid;
    blocks.push(root);
    debug!(cid = %head, children = children.len(), "Assembled folder");

    for block in blocks {
        emit(block)?;
    }
    Ok(head)
}
