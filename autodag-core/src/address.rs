//! Content addressing
//!
//! Every block is identified by a CIDv1 wrapping a BLAKE3-256 multihash.
//! Leaf nodes and opaque payloads use the `raw` codec, nodes that carry links
//! use `dag-pb`. The canonical text form is lowercase base32 (`b...`).

use crate::error::{AutoDagError, Result};
use cid::multihash::Multihash;
use cid::{Cid, Version};

/// Multicodec code of BLAKE3-256
pub const BLAKE3_CODE: u64 = 0x1e;

/// Multicodec code for opaque bytes
pub const RAW_CODEC: u64 = 0x55;

/// Multicodec code for DAG-PB structural nodes
pub const DAG_PB_CODEC: u64 = 0x70;

/// Length of a BLAKE3 digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// Build a CIDv1 for `bytes` under the given codec
pub fn cid_for(codec: u64, bytes: &[u8]) -> Cid {
    let digest = blake3::hash(bytes);
    // A 32-byte digest always fits the 64-byte multihash allocation.
    let hash = Multihash::<64>::wrap(BLAKE3_CODE, digest.as_bytes())
        .expect("blake3 digest fits in multihash");
    Cid::new_v1(codec, hash)
}

/// Address an opaque byte payload (raw codec)
pub fn address_of(bytes: &[u8]) -> Cid {
    cid_for(RAW_CODEC, bytes)
}

/// Address an encoded node; structural nodes get the dag-pb codec
pub fn node_cid(encoded: &[u8], structural: bool) -> Cid {
    let codec = if structural { DAG_PB_CODEC } else { RAW_CODEC };
    cid_for(codec, encoded)
}

/// Recompute the address of `bytes` and compare against `cid`
pub fn verify(cid: &Cid, bytes: &[u8]) -> bool {
    cid.hash().code() == BLAKE3_CODE && cid_for(cid.codec(), bytes) == *cid
}

/// Canonical text form (multibase base32 lowercase)
pub fn to_text(cid: &Cid) -> String {
    cid.to_string()
}

/// Parse the canonical text form
pub fn from_text(text: &str) -> Result<Cid> {
    let cid = Cid::try_from(text)?;
    if cid.version() != Version::V1 {
        return Err(AutoDagError::CidParse(format!(
            "expected CIDv1, got {:?}",
            cid.version()
        )));
    }
    if to_text(&cid) != text {
        return Err(AutoDagError::CidParse(format!(
            "not in canonical base32 form: {}",
            text
        )));
    }
    Ok(cid)
}

/// Parse a CID from its binary form
pub fn from_bytes(bytes: &[u8]) -> Result<Cid> {
    Ok(Cid::try_from(bytes)?)
}

/// Serde helpers that carry a CID as its canonical text
pub mod text_serde {
    use cid::Cid;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(cid: &Cid, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::to_text(cid))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Cid, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::from_text(&text).map_err(serde::de::Error::custom)
    }
}
