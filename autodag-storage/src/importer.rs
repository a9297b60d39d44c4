//! Import drivers
//!
//! Content flows source → transforms → rechunker → assembler → store, one
//! buffer at a time. Blocks are written children-first as soon as they are
//! built, so a head CID is only returned once everything under it is stored.
//! A cancelled import returns [`AutoDagError::Cancelled`]; blocks already
//! written stay in the store.

use std::path::Path;

use autodag_core::assembler::{assemble_folder, assemble_metadata, Block, DagAssembler};
use autodag_core::blockstore::{AsyncBlockstore, Blockstore};
use autodag_core::codec::Link;
use autodag_core::config::ChunkingOptions;
use autodag_core::error::{AutoDagError, Result};
use autodag_core::payload::NodeKind;
use autodag_core::rechunker::{rechunk, Rechunker};
use autodag_core::stream::{read_source, ByteSourceExt, Stage};
use autodag_core::transform::TransformOptions;
use bytes::Bytes;
use cid::Cid;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything an import needs besides the source and the store
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub chunking: ChunkingOptions,
    pub transforms: TransformOptions,
    /// Recorded on the head node only
    pub name: Option<String>,
    /// File or metadata; folders are built from links with [`import_folder`]
    pub kind: NodeKind,
    pub cancel: Option<CancellationToken>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            transforms: TransformOptions::default(),
            name: None,
            kind: NodeKind::File,
            cancel: None,
        }
    }
}

impl ImportOptions {
    pub fn with_chunking(mut self, chunking: ChunkingOptions) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_transforms(mut self, transforms: TransformOptions) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Outcome of a finished import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportResult {
    pub head: Cid,
    /// Blocks handed to the store (re-puts of shared blocks included)
    pub blocks: usize,
    /// Encoded bytes handed to the store
    pub bytes: u64,
}

/// Counts and cancellation shared by the sync and async drivers
struct BlockCounter {
    token: CancellationToken,
    blocks: usize,
    bytes: u64,
}

impl BlockCounter {
    fn new(options: &ImportOptions) -> Self {
        Self {
            token: options.cancel.clone().unwrap_or_default(),
            blocks: 0,
            bytes: 0,
        }
    }

    /// Called right before a block is written
    fn admit(&mut self, block: &Block) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(AutoDagError::Cancelled);
        }
        self.blocks += 1;
        self.bytes += block.bytes.len() as u64;
        Ok(())
    }

    fn finish(self, head: Cid) -> ImportResult {
        ImportResult {
            head,
            blocks: self.blocks,
            bytes: self.bytes,
        }
    }
}

fn assembler(options: &ImportOptions) -> Result<DagAssembler<'static>> {
    options.chunking.validate()?;
    let builders = options.kind.builders()?;
    Ok(DagAssembler::new(builders, options.chunking)?
        .with_name(options.name.clone())
        .with_upload_options(options.transforms.to_upload_options()?))
}

/// Import a byte source into `store`
pub fn import<S, I>(store: &S, source: I, options: &ImportOptions) -> Result<ImportResult>
where
    S: Blockstore + ?Sized,
    I: Iterator<Item = Result<Bytes>>,
{
    let mut assembler = assembler(options)?;
    let chain = options.transforms.forward()?;
    let mut counter = BlockCounter::new(options);
    let token = counter.token.clone();
    let mut write = |block: Block| -> Result<()> {
        counter.admit(&block)?;
        store.put(block.cid, block.bytes)
    };

    let mut source_size = 0u64;
    let staged = source
        .abortable(token)
        .inspect(|buffer| {
            if let Ok(buffer) = buffer {
                source_size += buffer.len() as u64;
            }
        })
        .through(chain);
    for chunk in rechunk(staged, options.chunking.chunk_size)? {
        for block in assembler.push_chunk(chunk?)? {
            write(block)?;
        }
    }

    assembler.set_source_size(source_size);
    let (head, blocks) = assembler.finish()?;
    for block in blocks {
        write(block)?;
    }

    info!(cid = %head, blocks = counter.blocks, bytes = counter.bytes, "Imported content");
    Ok(counter.finish(head))
}

/// Import a file from disk; the file name is used when no name is set
pub fn import_file<S>(store: &S, path: impl AsRef<Path>, options: &ImportOptions) -> Result<ImportResult>
where
    S: Blockstore + ?Sized,
{
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let mut options = options.clone();
    if options.name.is_none() {
        options.name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
    }
    debug!(path = ?path, "Importing file");
    import(store, read_source(file, options.chunking.chunk_size), &options)
}

/// Serialize `record` as JSON and store it as a metadata DAG
pub fn import_metadata<S, T>(
    store: &S,
    record: &T,
    name: Option<String>,
    chunking: ChunkingOptions,
) -> Result<Cid>
where
    S: Blockstore + ?Sized,
    T: Serialize + ?Sized,
{
    assemble_metadata(record, name, chunking, |block| store.put(block.cid, block.bytes))
}

/// Store a folder over children that are already in `store`
pub fn import_folder<S>(
    store: &S,
    children: &[Link],
    name: Option<&str>,
    chunking: ChunkingOptions,
) -> Result<Cid>
where
    S: Blockstore + ?Sized,
{
    for child in children {
        if !store.has(&child.cid)? {
            return Err(AutoDagError::NotFound(child.cid));
        }
    }
    assemble_folder(children, name, chunking, |block| store.put(block.cid, block.bytes))
}

/// Import an async byte stream into an async store
///
/// Drives the same stages as [`import`]; every block write is awaited before
/// the next source buffer is pulled.
pub async fn import_stream<S, St>(
    store: &S,
    mut stream: St,
    options: &ImportOptions,
) -> Result<ImportResult>
where
    S: AsyncBlockstore + ?Sized,
    St: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut assembler = assembler(options)?;
    let mut chain = options.transforms.forward()?;
    let mut rechunker = Rechunker::new(options.chunking.chunk_size)?;
    let mut counter = BlockCounter::new(options);

    let mut source_size = 0u64;
    while let Some(buffer) = stream.next().await {
        if counter.token.is_cancelled() {
            return Err(AutoDagError::Cancelled);
        }
        let buffer = buffer?;
        source_size += buffer.len() as u64;
        for staged in chain.push(buffer)? {
            for chunk in rechunker.push(staged)? {
                for block in assembler.push_chunk(chunk)? {
                    counter.admit(&block)?;
                    store.put(block.cid, block.bytes).await?;
                }
            }
        }
    }

    let mut tail = Vec::new();
    for staged in chain.finish()? {
        tail.extend(rechunker.push(staged)?);
    }
    tail.extend(rechunker.finish()?);
    for chunk in tail {
        for block in assembler.push_chunk(chunk)? {
            counter.admit(&block)?;
            store.put(block.cid, block.bytes).await?;
        }
    }

    assembler.set_source_size(source_size);
    let (head, blocks) = assembler.finish()?;
    for block in blocks {
        counter.admit(&block)?;
        store.put(block.cid, block.bytes).await?;
    }

    info!(cid = %head, blocks = counter.blocks, bytes = counter.bytes, "Imported stream");
    Ok(counter.finish(head))
}
