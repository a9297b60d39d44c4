//! Node payload
//!
//! Application metadata rides inside the generic node envelope: every node's
//! `data` field holds a protobuf-encoded [`NodePayload`] describing what the
//! node is (file chunk, folder, metadata record, ...), how large the content
//! beneath it is, and how deep its subtree goes.

use bytes::Bytes;
use prost::Message;

use crate::error::{AutoDagError, Result};

/// What a node represents within its DAG
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum NodeType {
    File = 0,
    FileChunk = 1,
    FileInlink = 2,
    Folder = 3,
    FolderInlink = 4,
    Metadata = 5,
    MetadataChunk = 6,
    MetadataInlink = 7,
}

impl NodeType {
    pub const ALL: [NodeType; 8] = [
        NodeType::File,
        NodeType::FileChunk,
        NodeType::FileInlink,
        NodeType::Folder,
        NodeType::FolderInlink,
        NodeType::Metadata,
        NodeType::MetadataChunk,
        NodeType::MetadataInlink,
    ];

    /// Content kind this node type belongs to
    pub fn kind(self) -> NodeKind {
        match self {
            NodeType::File | NodeType::FileChunk | NodeType::FileInlink => NodeKind::File,
            NodeType::Folder | NodeType::FolderInlink => NodeKind::Folder,
            NodeType::Metadata | NodeType::MetadataChunk | NodeType::MetadataInlink => {
                NodeKind::Metadata
            }
        }
    }

    /// Whether the node carries a slice of content
    pub fn is_chunk(self) -> bool {
        matches!(self, NodeType::FileChunk | NodeType::MetadataChunk)
    }

    /// Stable one-byte tag used by storage indexes
    pub fn tag(self) -> u8 {
        self as i32 as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        NodeType::try_from(tag as i32).ok()
    }
}

/// Top-level content kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Folder,
    Metadata,
}

impl NodeKind {
    /// Node types that belong to this kind
    pub fn node_types(self) -> impl Iterator<Item = NodeType> {
        NodeType::ALL.into_iter().filter(move |t| t.kind() == self)
    }
}

/// Compression algorithm recorded in upload options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CompressionAlgorithm {
    Zstd = 0,
}

/// Encryption algorithm recorded in upload options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EncryptionAlgorithm {
    Aes256Gcm = 0,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompressionOptions {
    #[prost(enumeration = "CompressionAlgorithm", tag = "1")]
    pub algorithm: i32,
    #[prost(uint32, tag = "2")]
    pub level: u32,
    #[prost(uint32, tag = "3")]
    pub chunk_size: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptionOptions {
    #[prost(enumeration = "EncryptionAlgorithm", tag = "1")]
    pub algorithm: i32,
    #[prost(uint32, tag = "2")]
    pub chunk_size: u32,
}

/// Non-secret record of the transforms applied before chunking
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadOptions {
    #[prost(message, optional, tag = "1")]
    pub compression: Option<CompressionOptions>,
    #[prost(message, optional, tag = "2")]
    pub encryption: Option<EncryptionOptions>,
    /// Length of the content before any transform ran
    #[prost(uint64, optional, tag = "3")]
    pub source_size: Option<u64>,
}

impl UploadOptions {
    pub fn is_empty(&self) -> bool {
        self.compression.is_none() && self.encryption.is_none()
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodePayload {
    #[prost(enumeration = "NodeType", tag = "1")]
    pub node_type: i32,
    #[prost(uint32, tag = "2")]
    pub link_depth: u32,
    #[prost(uint64, tag = "3")]
    pub size: u64,
    #[prost(string, optional, tag = "4")]
    pub name: Option<String>,
    #[prost(bytes = "bytes", optional, tag = "5")]
    pub data: Option<Bytes>,
    #[prost(message, optional, tag = "6")]
    pub upload_options: Option<UploadOptions>,
}

impl NodePayload {
    pub fn new(node_type: NodeType, link_depth: u32, size: u64) -> Self {
        Self {
            node_type: node_type as i32,
            link_depth,
            size,
            name: None,
            data: None,
            upload_options: None,
        }
    }

    pub fn with_name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_owned);
        self
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_upload_options(mut self, options: Option<&UploadOptions>) -> Self {
        self.upload_options = options.filter(|o| !o.is_empty()).cloned();
        self
    }

    /// Strictly typed node type; unknown discriminants are malformed
    pub fn kind(&self) -> Result<NodeType> {
        NodeType::try_from(self.node_type).map_err(|_| {
            AutoDagError::MalformedNode(format!("unknown node type {}", self.node_type))
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let payload = NodePayload::decode(bytes)?;
        payload.kind()?;
        Ok(payload)
    }

    /// Inline content, required for chunk and single-leaf nodes
    pub fn content(&self) -> Result<&Bytes> {
        self.data.as_ref().ok_or_else(|| {
            AutoDagError::MissingPayload(format!(
                "{:?} node carries no inline content",
                self.kind().unwrap_or(NodeType::File)
            ))
        })
    }
}
