//! In-memory DAG
//!
//! Nodes live in an arena keyed by CID; children are referenced by CID only.
//! A `Dag` is only handed out sealed: every link reachable from the head
//! resolves inside the arena and the reachable graph has no cycles.

use std::collections::{HashMap, HashSet};

use bytes::{Bytes, BytesMut};
use cid::Cid;
use tracing::debug;

use crate::address;
use crate::assembler::{Block, DagAssembler};
use crate::blockstore::Blockstore;
use crate::builders::Builders;
use crate::codec::DagNode;
use crate::config::ChunkingOptions;
use crate::error::{AutoDagError, Result};
use crate::payload::{NodePayload, NodeType};
use crate::stream::bytes_source;

/// A sealed Merkle-DAG
#[derive(Debug, Clone)]
pub struct Dag {
    head: Cid,
    nodes: HashMap<Cid, DagNode>,
}

impl Dag {
    /// Assemble a DAG from a byte source
    pub fn build<I>(
        source: I,
        builders: &dyn Builders,
        options: ChunkingOptions,
        name: Option<&str>,
    ) -> Result<Self>
    where
        I: Iterator<Item = Result<Bytes>>,
    {
        let mut blocks = Vec::new();
        let head = DagAssembler::new(builders, options)?
            .with_name(name.map(str::to_owned))
            .assemble(source, |block| {
                blocks.push(block);
                Ok(())
            })?;
        Self::from_blocks(head, blocks)
    }

    /// Assemble a DAG over in-memory content
    pub fn from_content(
        data: impl Into<Bytes>,
        builders: &dyn Builders,
        options: ChunkingOptions,
        name: Option<&str>,
    ) -> Result<Self> {
        let buffer = options.chunk_size;
        Self::build(bytes_source(data, buffer), builders, options, name)
    }

    /// Collect blocks into a DAG and seal it
    pub fn from_blocks(head: Cid, blocks: impl IntoIterator<Item = Block>) -> Result<Self> {
        let mut nodes = HashMap::new();
        for block in blocks {
            match nodes.get(&block.cid) {
                Some(existing) if existing != &block.node => {
                    return Err(AutoDagError::HashCollision(block.cid));
                }
                Some(_) => {}
                None => {
                    nodes.insert(block.cid, block.node);
                }
            }
        }
        let dag = Self { head, nodes };
        dag.seal()?;
        Ok(dag)
    }

    /// Fetch every node reachable from `head` out of a store
    ///
    /// Each block is checked against its CID; a mismatch is `MalformedNode`.
    pub fn load<S: Blockstore + ?Sized>(head: Cid, store: &S) -> Result<Self> {
        let mut nodes = HashMap::new();
        let mut stack = vec![head];
        while let Some(cid) = stack.pop() {
            if nodes.contains_key(&cid) {
                continue;
            }
            let bytes = store.get(&cid)?;
            if !address::verify(&cid, &bytes) {
                return Err(AutoDagError::MalformedNode(format!(
                    "block {} does not match its address",
                    cid
                )));
            }
            let node = DagNode::decode(&bytes)?;
            stack.extend(node.links.iter().map(|l| l.cid));
            nodes.insert(cid, node);
        }
        let dag = Self { head, nodes };
        dag.seal()?;
        Ok(dag)
    }

    /// Verify that the graph under the head is closed and acyclic
    pub fn seal(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Open,
            Done,
        }

        let mut marks: HashMap<Cid, Mark> = HashMap::new();
        // (cid, next child index)
        let mut stack: Vec<(Cid, usize)> = vec![(self.head, 0)];
        if !self.nodes.contains_key(&self.head) {
            return Err(AutoDagError::NotFound(self.head));
        }
        marks.insert(self.head, Mark::Open);

        while let Some((cid, index)) = stack.pop() {
            let node = self.node(&cid)?;
            match node.links.get(index) {
                Some(link) => {
                    stack.push((cid, index + 1));
                    match marks.get(&link.cid) {
                        Some(Mark::Open) => {
                            return Err(AutoDagError::MalformedNode(format!(
                                "cycle through {}",
                                link.cid
                            )));
                        }
                        Some(Mark::Done) => {}
                        None => {
                            if !self.nodes.contains_key(&link.cid) {
                                return Err(AutoDagError::NotFound(link.cid));
                            }
                            marks.insert(link.cid, Mark::Open);
                            stack.push((link.cid, 0));
                        }
                    }
                }
                None => {
                    marks.insert(cid, Mark::Done);
                }
            }
        }
        Ok(())
    }

    pub fn head(&self) -> Cid {
        self.head
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, cid: &Cid) -> Option<&DagNode> {
        self.nodes.get(cid)
    }

    pub fn nodes(&self) -> &HashMap<Cid, DagNode> {
        &self.nodes
    }

    fn node(&self, cid: &Cid) -> Result<&DagNode> {
        self.nodes.get(cid).ok_or(AutoDagError::NotFound(*cid))
    }

    /// Payload of the head node
    pub fn head_payload(&self) -> Result<NodePayload> {
        self.node(&self.head)?.payload()
    }

    /// Link depth recorded on the head (0 for a single-node DAG)
    pub fn depth(&self) -> Result<u32> {
        Ok(self.head_payload()?.link_depth)
    }

    /// Nodes in depth-first pre-order, following links left to right
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            dag: self,
            stack: vec![self.head],
        }
    }

    /// Content-carrying leaves in content order: `(cid, data)`
    pub fn leaves(&self) -> Result<Vec<(Cid, Bytes)>> {
        let mut leaves = Vec::new();
        for item in self.walk() {
            let (cid, node) = item?;
            if !node.is_leaf() {
                continue;
            }
            let payload = node.payload()?;
            leaves.push((cid, payload.content()?.clone()));
        }
        Ok(leaves)
    }

    /// Reassembled content bytes
    pub fn content(&self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        for (_, data) in self.leaves()? {
            out.extend_from_slice(&data);
        }
        Ok(out.freeze())
    }

    /// Number of stored nodes of the given type
    pub fn count_of(&self, node_type: NodeType) -> usize {
        self.nodes
            .values()
            .filter(|n| n.node_type().map(|t| t == node_type).unwrap_or(false))
            .count()
    }

    /// Write every node to `store`, children before parents
    pub fn persist<S: Blockstore + ?Sized>(&self, store: &S) -> Result<()> {
        let mut written: HashSet<Cid> = HashSet::new();
        let mut stack: Vec<(Cid, bool)> = vec![(self.head, false)];

        while let Some((cid, expanded)) = stack.pop() {
            if written.contains(&cid) {
                continue;
            }
            let node = self.node(&cid)?;
            if expanded || node.is_leaf() {
                store.put(cid, node.encode())?;
                written.insert(cid);
                continue;
            }
            stack.push((cid, true));
            for link in node.links.iter().rev() {
                if !written.contains(&link.cid) {
                    stack.push((link.cid, false));
                }
            }
        }

        debug!(cid = %self.head, nodes = written.len(), "Persisted DAG");
        Ok(())
    }
}

/// Pre-order traversal of a [`Dag`]
pub struct Walk<'a> {
    dag: &'a Dag,
    stack: Vec<Cid>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = Result<(Cid, &'a DagNode)>;

    fn next(&mut self) -> Option<Self::Item> {
        let cid = self.stack.pop()?;
        match self.dag.node(&cid) {
            Ok(node) => {
                self.stack.extend(node.links.iter().rev().map(|l| l.cid));
                Some(Ok((cid, node)))
            }
            Err(e) => {
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}
