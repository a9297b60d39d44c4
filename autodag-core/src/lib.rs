//! AutoDAG Core Library
//!
//! Content-addressed Merkle-DAG construction for arbitrary byte streams.
//! This crate provides:
//! - BLAKE3 CIDv1 addressing and the canonical DAG-PB node codec
//! - Fixed-size rechunking of lazy byte streams
//! - File, folder and metadata DAG assembly with bounded fan-out
//! - Optional zstd compression and AES-256-GCM framed encryption ahead of chunking
//! - The blockstore contract and offchain JSON manifests

pub mod address;
pub mod assembler;
pub mod blockstore;
pub mod builders;
pub mod codec;
pub mod config;
pub mod dag;
pub mod error;
pub mod manifest;
pub mod payload;
pub mod rechunker;
pub mod stream;
pub mod transform;

pub use assembler::{assemble_folder, assemble_metadata, Block, DagAssembler};
pub use blockstore::{AsyncBlockstore, AsyncWrapper, Blockstore, BoxFuture, CidIter};
pub use builders::{Builders, FileBuilders, MetadataBuilders};
pub use cid::Cid;
pub use codec::{DagNode, Link};
pub use config::ChunkingOptions;
pub use dag::Dag;
pub use error::{AutoDagError, Result};
pub use manifest::{
    ChildInfo, ChildType, ChunkInfo, OffchainFileMetadata, OffchainFolderMetadata,
    OffchainMetadata,
};
pub use payload::{NodeKind, NodePayload, NodeType, UploadOptions};
pub use rechunker::{rechunk, Rechunker};
pub use stream::{bytes_source, collect_bytes, read_source, ByteSourceExt, ByteStream, Stage};
pub use transform::{CompressionConfig, EncryptionConfig, EncryptionKey, TransformOptions};

/// Node size constants
///
/// Override at runtime via AUTODAG_CHUNK_SIZE / AUTODAG_MAX_NODE_SIZE /
/// AUTODAG_MAX_LINKS_PER_NODE (see [`ChunkingOptions::from_env`]).
pub const DEFAULT_MAX_NODE_SIZE: usize = 64 * 1024; // 64 KB
pub const DEFAULT_CHUNK_SIZE: usize = DEFAULT_MAX_NODE_SIZE - 1024; // room for the envelope
pub const DEFAULT_MAX_LINKS_PER_NODE: usize = DEFAULT_MAX_NODE_SIZE / 64;

/// Upper bound on one encoded link: field tags, a 36-byte CID and a size
pub const MAX_ENCODED_LINK_SIZE: usize = 40;

/// Upper bound on an unnamed inlink/root payload plus its envelope field
pub const NODE_PAYLOAD_OVERHEAD: usize = 32;
