//! DAG node codec
//!
//! Nodes use the DAG-PB envelope: an optional `Data` byte field plus an
//! ordered list of `Links`. Encoding is canonical: links are written first
//! (field 2) in order, data last (field 1), and within a link the hash, name
//! and size appear in field order. Decoding accepts only that form, so the
//! bytes a CID is computed over are unique for a given node.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use cid::Cid;
use prost::encoding::{
    decode_key, decode_varint, encode_key, encode_varint, encoded_len_varint, WireType,
};

use crate::address;
use crate::error::{AutoDagError, Result};
use crate::payload::{NodePayload, NodeType};

const NODE_DATA_TAG: u32 = 1;
const NODE_LINKS_TAG: u32 = 2;
const LINK_HASH_TAG: u32 = 1;
const LINK_NAME_TAG: u32 = 2;
const LINK_SIZE_TAG: u32 = 3;

/// Link from a node to a child block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub cid: Cid,
    pub name: Option<String>,
    pub size: Option<u64>,
}

impl Link {
    pub fn new(cid: Cid) -> Self {
        Self {
            cid,
            name: None,
            size: None,
        }
    }

    pub fn named(cid: Cid, name: impl Into<String>, size: u64) -> Self {
        Self {
            cid,
            name: Some(name.into()),
            size: Some(size),
        }
    }

    fn body_len(&self) -> usize {
        let hash_len = self.cid.to_bytes().len();
        let mut len = 1 + encoded_len_varint(hash_len as u64) + hash_len;
        if let Some(name) = &self.name {
            len += 1 + encoded_len_varint(name.len() as u64) + name.len();
        }
        if let Some(size) = self.size {
            len += 1 + encoded_len_varint(size);
        }
        len
    }
}

/// A DAG node: optional inline data plus ordered links
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DagNode {
    pub data: Option<Bytes>,
    pub links: Vec<Link>,
}

impl DagNode {
    pub fn leaf(data: Bytes) -> Self {
        Self {
            data: Some(data),
            links: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.links.is_empty()
    }

    /// Size of the canonical encoding in bytes
    pub fn encoded_len(&self) -> usize {
        let links: usize = self
            .links
            .iter()
            .map(|link| {
                let body = link.body_len();
                1 + encoded_len_varint(body as u64) + body
            })
            .sum();
        let data = self
            .data
            .as_ref()
            .map(|d| 1 + encoded_len_varint(d.len() as u64) + d.len())
            .unwrap_or(0);
        links + data
    }

    /// Canonical binary encoding
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        for link in &self.links {
            encode_key(NODE_LINKS_TAG, WireType::LengthDelimited, &mut buf);
            encode_varint(link.body_len() as u64, &mut buf);

            let hash = link.cid.to_bytes();
            encode_key(LINK_HASH_TAG, WireType::LengthDelimited, &mut buf);
            encode_varint(hash.len() as u64, &mut buf);
            buf.put_slice(&hash);

            if let Some(name) = &link.name {
                encode_key(LINK_NAME_TAG, WireType::LengthDelimited, &mut buf);
                encode_varint(name.len() as u64, &mut buf);
                buf.put_slice(name.as_bytes());
            }
            if let Some(size) = link.size {
                encode_key(LINK_SIZE_TAG, WireType::Varint, &mut buf);
                encode_varint(size, &mut buf);
            }
        }
        if let Some(data) = &self.data {
            encode_key(NODE_DATA_TAG, WireType::LengthDelimited, &mut buf);
            encode_varint(data.len() as u64, &mut buf);
            buf.put_slice(data);
        }
        buf.freeze()
    }

    /// Decode the canonical encoding
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let mut node = DagNode::default();

        while buf.has_remaining() {
            let (tag, wire_type) = decode_key(&mut buf)?;
            expect_wire_type(wire_type, WireType::LengthDelimited)?;
            let field = take_length_delimited(&mut buf)?;
            match tag {
                NODE_LINKS_TAG => {
                    if node.data.is_some() {
                        return Err(malformed("link after data field"));
                    }
                    node.links.push(decode_link(field)?);
                }
                NODE_DATA_TAG => {
                    if node.data.is_some() {
                        return Err(malformed("duplicate data field"));
                    }
                    node.data = Some(Bytes::copy_from_slice(field));
                }
                other => return Err(malformed(&format!("unknown node field {}", other))),
            }
        }

        Ok(node)
    }

    /// Decode the application payload carried in `data`
    pub fn payload(&self) -> Result<NodePayload> {
        let data = self.data.as_ref().ok_or_else(|| {
            AutoDagError::MissingPayload("node has no data field".to_string())
        })?;
        NodePayload::from_bytes(data)
    }

    /// Node type from the payload
    pub fn node_type(&self) -> Result<NodeType> {
        self.payload()?.kind()
    }

    /// Content identifier of this node
    pub fn cid(&self) -> Cid {
        address::node_cid(&self.encode(), !self.is_leaf())
    }
}

/// Decode a node that must be a leaf carrying its content inline
pub fn decode_leaf(bytes: &[u8]) -> Result<(DagNode, NodePayload)> {
    let node = DagNode::decode(bytes)?;
    if !node.is_leaf() {
        return Err(malformed("expected a leaf node"));
    }
    let payload = node.payload()?;
    payload.content()?;
    Ok((node, payload))
}

/// Node type of an encoded block, used by stores to index blocks by kind
pub fn node_type_of(bytes: &[u8]) -> Result<NodeType> {
    DagNode::decode(bytes)?.node_type()
}

fn decode_link(mut buf: &[u8]) -> Result<Link> {
    let mut cid = None;
    let mut name = None;
    let mut size = None;
    let mut last_tag = 0;

    while buf.has_remaining() {
        let (tag, wire_type) = decode_key(&mut buf)?;
        if tag <= last_tag {
            return Err(malformed("link fields out of order"));
        }
        last_tag = tag;
        match tag {
            LINK_HASH_TAG => {
                expect_wire_type(wire_type, WireType::LengthDelimited)?;
                let hash = take_length_delimited(&mut buf)?;
                cid = Some(Cid::try_from(hash).map_err(|e| malformed(&e.to_string()))?);
            }
            LINK_NAME_TAG => {
                expect_wire_type(wire_type, WireType::LengthDelimited)?;
                let raw = take_length_delimited(&mut buf)?;
                let text = std::str::from_utf8(raw)
                    .map_err(|_| malformed("link name is not utf-8"))?;
                name = Some(text.to_string());
            }
            LINK_SIZE_TAG => {
                expect_wire_type(wire_type, WireType::Varint)?;
                size = Some(decode_varint(&mut buf)?);
            }
            other => return Err(malformed(&format!("unknown link field {}", other))),
        }
    }

    let cid = cid.ok_or_else(|| malformed("link without hash"))?;
    Ok(Link { cid, name, size })
}

fn take_length_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = decode_varint(buf)? as usize;
    if len > buf.len() {
        return Err(malformed("truncated field"));
    }
    let (field, rest) = buf.split_at(len);
    *buf = rest;
    Ok(field)
}

fn expect_wire_type(actual: WireType, expected: WireType) -> Result<()> {
    if actual != expected {
        return Err(malformed(&format!(
            "unexpected wire type {:?}, expected {:?}",
            actual, expected
        )));
    }
    Ok(())
}

fn malformed(reason: &str) -> AutoDagError {
    AutoDagError::MalformedNode(reason.to_string())
}
