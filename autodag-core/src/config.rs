//! Chunking configuration

use crate::error::{AutoDagError, Result};
use crate::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS_PER_NODE, DEFAULT_MAX_NODE_SIZE, MAX_ENCODED_LINK_SIZE,
    NODE_PAYLOAD_OVERHEAD,
};

/// Shape of the DAG built over a byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    /// Size of every content chunk except possibly the last
    pub chunk_size: usize,

    /// Upper bound on an encoded node (root name/options excluded)
    pub max_node_size: usize,

    /// Fan-out of inlink and root nodes
    pub max_links_per_node: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_node_size: DEFAULT_MAX_NODE_SIZE,
            max_links_per_node: DEFAULT_MAX_LINKS_PER_NODE,
        }
    }
}

impl ChunkingOptions {
    /// Read overrides from `AUTODAG_CHUNK_SIZE`, `AUTODAG_MAX_NODE_SIZE` and
    /// `AUTODAG_MAX_LINKS_PER_NODE`, falling back to compile-time defaults.
    pub fn from_env() -> Self {
        fn read(var: &str, default: usize) -> usize {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(default)
        }

        Self {
            chunk_size: read("AUTODAG_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            max_node_size: read("AUTODAG_MAX_NODE_SIZE", DEFAULT_MAX_NODE_SIZE),
            max_links_per_node: read("AUTODAG_MAX_LINKS_PER_NODE", DEFAULT_MAX_LINKS_PER_NODE),
        }
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_max_node_size(mut self, bytes: usize) -> Self {
        self.max_node_size = bytes;
        self
    }

    pub fn with_max_links_per_node(mut self, links: usize) -> Self {
        self.max_links_per_node = links;
        self
    }

    /// Check the options before any block is produced
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(AutoDagError::InvalidConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.max_links_per_node == 0 {
            return Err(AutoDagError::InvalidConfig(
                "max links per node must be positive".to_string(),
            ));
        }
        if self.max_node_size == 0 {
            return Err(AutoDagError::InvalidConfig(
                "max node size must be positive".to_string(),
            ));
        }
        let fanout_bytes = self
            .max_links_per_node
            .saturating_mul(MAX_ENCODED_LINK_SIZE)
            .saturating_add(NODE_PAYLOAD_OVERHEAD);
        if fanout_bytes > self.max_node_size {
            return Err(AutoDagError::InvalidConfig(format!(
                "{} links per node need up to {} bytes, max node size is {}",
                self.max_links_per_node, fanout_bytes, self.max_node_size
            )));
        }
        Ok(())
    }
}
