//! Node builders
//!
//! The assembler is written once against the [`Builders`] contract. Two flat
//! implementations exist, one for file content and one for metadata records;
//! they differ only in the node types stamped into each payload.

use bytes::Bytes;
use cid::Cid;

use crate::codec::{DagNode, Link};
use crate::error::{AutoDagError, Result};
use crate::payload::{NodeKind, NodePayload, NodeType, UploadOptions};

/// Four-operation node construction contract
pub trait Builders: Send + Sync {
    /// Content kind produced by this builder set
    fn kind(&self) -> NodeKind;

    /// Node type of whole-content nodes (single leaves and roots)
    fn root_type(&self) -> NodeType;

    /// Node type of fixed-size content slices
    fn chunk_type(&self) -> NodeType;

    /// Node type of interior nodes
    fn inlink_type(&self) -> NodeType;

    /// Leaf holding the whole content inline
    fn single(&self, data: Bytes, name: Option<&str>, options: Option<&UploadOptions>) -> DagNode {
        let payload = NodePayload::new(self.root_type(), 0, data.len() as u64)
            .with_name(name)
            .with_upload_options(options)
            .with_data(data);
        DagNode::leaf(payload.to_bytes())
    }

    /// Leaf holding one fixed-size slice of content
    fn chunk(&self, data: Bytes) -> DagNode {
        let payload = NodePayload::new(self.chunk_type(), 0, data.len() as u64).with_data(data);
        DagNode::leaf(payload.to_bytes())
    }

    /// Interior node over `children`, rejected if it outgrows `max_node_size`
    fn inlink(
        &self,
        children: &[Cid],
        size: u64,
        link_depth: u32,
        max_node_size: usize,
    ) -> Result<DagNode> {
        let payload = NodePayload::new(self.inlink_type(), link_depth, size);
        let node = linked_node(children, payload);
        check_node_size(&node, max_node_size)?;
        Ok(node)
    }

    /// Root node; name and upload options do not count against the size limit
    fn root(
        &self,
        children: &[Cid],
        size: u64,
        link_depth: u32,
        name: Option<&str>,
        max_node_size: usize,
        options: Option<&UploadOptions>,
    ) -> Result<DagNode> {
        let bare = NodePayload::new(self.root_type(), link_depth, size);
        check_node_size(&linked_node(children, bare.clone()), max_node_size)?;
        let payload = bare.with_name(name).with_upload_options(options);
        Ok(linked_node(children, payload))
    }
}

/// Builders for file content
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBuilders;

impl Builders for FileBuilders {
    fn kind(&self) -> NodeKind {
        NodeKind::File
    }

    fn root_type(&self) -> NodeType {
        NodeType::File
    }

    fn chunk_type(&self) -> NodeType {
        NodeType::FileChunk
    }

    fn inlink_type(&self) -> NodeType {
        NodeType::FileInlink
    }
}

/// Builders for structured metadata records
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataBuilders;

impl Builders for MetadataBuilders {
    fn kind(&self) -> NodeKind {
        NodeKind::Metadata
    }

    fn root_type(&self) -> NodeType {
        NodeType::Metadata
    }

    fn chunk_type(&self) -> NodeType {
        NodeType::MetadataChunk
    }

    fn inlink_type(&self) -> NodeType {
        NodeType::MetadataInlink
    }
}

impl NodeKind {
    /// Builder set for content of this kind
    pub fn builders(self) -> Result<&'static dyn Builders> {
        match self {
            NodeKind::File => Ok(&FileBuilders),
            NodeKind::Metadata => Ok(&MetadataBuilders),
            NodeKind::Folder => Err(AutoDagError::InvalidConfig(
                "folders are assembled from child links, not byte streams".to_string(),
            )),
        }
    }
}

/// Interior folder node; links carry each child's name and size
pub fn folder_inlink(
    children: &[Link],
    size: u64,
    link_depth: u32,
    max_node_size: usize,
) -> Result<DagNode> {
    let payload = NodePayload::new(NodeType::FolderInlink, link_depth, size);
    let node = DagNode {
        data: Some(payload.to_bytes()),
        links: children.to_vec(),
    };
    check_node_size(&node, max_node_size)?;
    Ok(node)
}

/// Folder root over `children`
pub fn folder_root(
    children: &[Link],
    size: u64,
    link_depth: u32,
    name: Option<&str>,
    max_node_size: usize,
) -> Result<DagNode> {
    let bare = NodePayload::new(NodeType::Folder, link_depth, size);
    let node = DagNode {
        data: Some(bare.clone().with_name(name).to_bytes()),
        links: children.to_vec(),
    };
    let unnamed = DagNode {
        data: Some(bare.to_bytes()),
        links: children.to_vec(),
    };
    check_node_size(&unnamed, max_node_size)?;
    Ok(node)
}

fn linked_node(children: &[Cid], payload: NodePayload) -> DagNode {
    DagNode {
        data: Some(payload.to_bytes()),
        links: children.iter().copied().map(Link::new).collect(),
    }
}

/// Reject nodes whose encoding exceeds the configured limit
pub fn check_node_size(node: &DagNode, max_node_size: usize) -> Result<()> {
    let len = node.encoded_len();
    if len > max_node_size {
        return Err(AutoDagError::InvalidConfig(format!(
            "node of {} bytes exceeds max node size {}",
            len, max_node_size
        )));
    }
    Ok(())
}
