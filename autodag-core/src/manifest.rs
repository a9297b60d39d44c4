//! Offchain manifests
//!
//! JSON descriptions of a stored file or folder: the head CID, total size and
//! the ordered list of chunk CIDs (or child entries for folders). Manifests
//! are derived purely from a finished DAG; building one twice yields the same
//! value.
//!
//! A file's `totalSize` is the length of the original content. For
//! transformed uploads that is the source size recorded on the head node;
//! otherwise it is the sum of the chunk payloads.

use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::address::text_serde;
use crate::blockstore::Blockstore;
use crate::codec::DagNode;
use crate::dag::Dag;
use crate::error::{AutoDagError, Result};
use crate::payload::NodeType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub size: u64,
    #[serde(with = "text_serde")]
    pub cid: Cid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildType {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildInfo {
    #[serde(rename = "type")]
    pub child_type: ChildType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(with = "text_serde")]
    pub cid: Cid,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffchainFileMetadata {
    #[serde(with = "text_serde")]
    pub data_cid: Cid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub total_size: u64,
    pub total_chunks: u64,
    pub chunks: Vec<ChunkInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffchainFolderMetadata {
    #[serde(with = "text_serde")]
    pub data_cid: Cid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub total_size: u64,
    pub total_files: u64,
    pub children: Vec<ChildInfo>,
}

/// Manifest of either kind, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OffchainMetadata {
    File(OffchainFileMetadata),
    Folder(OffchainFolderMetadata),
}

impl OffchainMetadata {
    pub fn data_cid(&self) -> Cid {
        match self {
            OffchainMetadata::File(m) => m.data_cid,
            OffchainMetadata::Folder(m) => m.data_cid,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Manifest of a file DAG: chunks in content order
pub fn file_metadata(dag: &Dag, mime_type: Option<&str>) -> Result<OffchainFileMetadata> {
    let head = dag.head_payload()?;
    let chunks: Vec<ChunkInfo> = dag
        .leaves()?
        .into_iter()
        .map(|(cid, data)| ChunkInfo {
            size: data.len() as u64,
            cid,
        })
        .collect();
    let source_size = head.upload_options.and_then(|o| o.source_size);
    Ok(build_file_metadata(
        dag.head(),
        head.name,
        mime_type,
        source_size,
        chunks,
    ))
}

/// Same as [`file_metadata`], reading nodes lazily from a store
pub fn file_metadata_from_store<S: Blockstore + ?Sized>(
    store: &S,
    head: Cid,
    mime_type: Option<&str>,
) -> Result<OffchainFileMetadata> {
    let root = DagNode::decode(&store.get(&head)?)?;
    let payload = root.payload()?;
    let source_size = payload.upload_options.and_then(|o| o.source_size);
    let name = payload.name;

    let mut chunks = Vec::new();
    let mut stack = vec![(head, root)];
    while let Some((cid, node)) = stack.pop() {
        if node.is_leaf() {
            let payload = node.payload()?;
            chunks.push(ChunkInfo {
                size: payload.content()?.len() as u64,
                cid,
            });
            continue;
        }
        for link in node.links.iter().rev() {
            stack.push((link.cid, DagNode::decode(&store.get(&link.cid)?)?));
        }
    }
    Ok(build_file_metadata(head, name, mime_type, source_size, chunks))
}

fn build_file_metadata(
    data_cid: Cid,
    name: Option<String>,
    mime_type: Option<&str>,
    source_size: Option<u64>,
    chunks: Vec<ChunkInfo>,
) -> OffchainFileMetadata {
    OffchainFileMetadata {
        data_cid,
        name,
        mime_type: mime_type.map(str::to_owned),
        total_size: source_size.unwrap_or_else(|| chunks.iter().map(|c| c.size).sum()),
        total_chunks: chunks.len() as u64,
        chunks,
    }
}

/// Manifest of a folder from caller-supplied child descriptors
pub fn folder_metadata(
    data_cid: Cid,
    name: Option<&str>,
    children: Vec<ChildInfo>,
) -> OffchainFolderMetadata {
    OffchainFolderMetadata {
        data_cid,
        name: name.map(str::to_owned),
        total_size: children.iter().map(|c| c.total_size).sum(),
        total_files: children.len() as u64,
        children,
    }
}

/// Manifest of a stored folder DAG; folder inlinks are flattened
pub fn folder_metadata_from_store<S: Blockstore + ?Sized>(
    store: &S,
    head: Cid,
) -> Result<OffchainFolderMetadata> {
    let root = DagNode::decode(&store.get(&head)?)?;
    let payload = root.payload()?;
    if payload.kind()? != NodeType::Folder {
        return Err(AutoDagError::MalformedNode(format!(
            "{} is not a folder root",
            head
        )));
    }

    let mut children = Vec::new();
    let mut stack: Vec<_> = root.links.iter().rev().cloned().collect();
    while let Some(link) = stack.pop() {
        let node = DagNode::decode(&store.get(&link.cid)?)?;
        let child = node.payload()?;
        let child_type = match child.kind()? {
            NodeType::FolderInlink => {
                stack.extend(node.links.iter().rev().cloned());
                continue;
            }
            NodeType::Folder => ChildType::Folder,
            NodeType::File => ChildType::File,
            t => {
                return Err(AutoDagError::MalformedNode(format!(
                    "folder child {} has unexpected type {:?}",
                    link.cid, t
                )));
            }
        };
        children.push(ChildInfo {
            child_type,
            name: link.name.clone(),
            cid: link.cid,
            total_size: child.size,
        });
    }

    Ok(folder_metadata(head, payload.name.as_deref(), children))
}
