//! Transform pipeline
//!
//! Optional stages applied to the byte source ahead of chunking. The order is
//! fixed: compress, then encrypt. Reading reverses it. Only the non-secret
//! parameters are recorded in the DAG root as [`UploadOptions`]; the key is
//! never stored.

pub mod compression;
pub mod encryption;

pub use compression::{Compressor, Decompressor};
pub use encryption::{Decryptor, EncryptionKey, Encryptor};

use crate::error::{AutoDagError, Result};
use crate::payload::{
    CompressionAlgorithm, CompressionOptions, EncryptionAlgorithm, EncryptionOptions,
    UploadOptions,
};
use crate::stream::StageChain;

/// Default internal chunk size of the transform stages
pub const DEFAULT_TRANSFORM_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    pub algorithm: CompressionAlgorithm,
    /// 0-9
    pub level: u32,
    pub chunk_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Zstd,
            level: 3,
            chunk_size: DEFAULT_TRANSFORM_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    pub algorithm: EncryptionAlgorithm,
    pub key: EncryptionKey,
    pub chunk_size: usize,
}

impl EncryptionConfig {
    pub fn new(key: EncryptionKey) -> Self {
        Self {
            algorithm: EncryptionAlgorithm::Aes256Gcm,
            key,
            chunk_size: DEFAULT_TRANSFORM_CHUNK_SIZE,
        }
    }

    /// Derive the key from a password and salt
    pub fn from_password(password: &[u8], salt: &[u8]) -> Result<Self> {
        Ok(Self::new(EncryptionKey::derive_from_password(password, salt)?))
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }
}

/// Transforms applied before chunking
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub compression: Option<CompressionConfig>,
    pub encryption: Option<EncryptionConfig>,
}

impl TransformOptions {
    pub fn with_compression(mut self, config: CompressionConfig) -> Self {
        self.compression = Some(config);
        self
    }

    pub fn with_encryption(mut self, config: EncryptionConfig) -> Self {
        self.encryption = Some(config);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.compression.is_none() && self.encryption.is_none()
    }

    /// Record of the applied transforms, `None` when there are none
    pub fn to_upload_options(&self) -> Result<Option<UploadOptions>> {
        if self.is_empty() {
            return Ok(None);
        }
        let compression = self
            .compression
            .as_ref()
            .map(|c| -> Result<CompressionOptions> {
                Ok(CompressionOptions {
                    algorithm: c.algorithm as i32,
                    level: c.level,
                    chunk_size: to_u32(c.chunk_size)?,
                })
            })
            .transpose()?;
        let encryption = self
            .encryption
            .as_ref()
            .map(|e| -> Result<EncryptionOptions> {
                Ok(EncryptionOptions {
                    algorithm: e.algorithm as i32,
                    chunk_size: to_u32(e.chunk_size)?,
                })
            })
            .transpose()?;
        Ok(Some(UploadOptions {
            compression,
            encryption,
            source_size: None,
        }))
    }

    /// Stages for the write path: compress, then encrypt
    pub fn forward(&self) -> Result<StageChain> {
        let mut chain = StageChain::new();
        if let Some(c) = &self.compression {
            chain = chain.then(Compressor::new(c.level, c.chunk_size)?);
        }
        if let Some(e) = &self.encryption {
            chain = chain.then(Encryptor::new(&e.key, e.chunk_size)?);
        }
        Ok(chain)
    }
}

fn to_u32(chunk_size: usize) -> Result<u32> {
    if chunk_size == 0 {
        return Err(AutoDagError::InvalidConfig(
            "transform chunk size must be positive".to_string(),
        ));
    }
    u32::try_from(chunk_size).map_err(|_| {
        AutoDagError::InvalidConfig(format!("transform chunk size {} too large", chunk_size))
    })
}

/// Stages for the read path: decrypt, then decompress
///
/// Fails with `InvalidConfig` when the content is encrypted and no key is
/// supplied.
pub fn reverse(options: &UploadOptions, key: Option<&EncryptionKey>) -> Result<StageChain> {
    let mut chain = StageChain::new();
    if let Some(e) = &options.encryption {
        EncryptionAlgorithm::try_from(e.algorithm).map_err(|_| {
            AutoDagError::InvalidConfig(format!("unknown encryption algorithm {}", e.algorithm))
        })?;
        let key = key.ok_or_else(|| {
            AutoDagError::InvalidConfig("content is encrypted but no key was given".to_string())
        })?;
        chain = chain.then(Decryptor::new(key, e.chunk_size as usize)?);
    }
    if let Some(c) = &options.compression {
        CompressionAlgorithm::try_from(c.algorithm).map_err(|_| {
            AutoDagError::InvalidConfig(format!("unknown compression algorithm {}", c.algorithm))
        })?;
        chain = chain.then(Decompressor::new()?);
    }
    Ok(chain)
}
