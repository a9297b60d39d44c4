//! Frame encryption
//!
//! Provides:
//! - AES-256-GCM authenticated encryption
//! - Key derivation from a password and salt using Argon2
//! - Framed streaming: plaintext is cut into fixed-size frames, each sealed
//!   on its own as `nonce || ciphertext || tag` with the frame index as
//!   associated data, so frames verify independently and cannot be reordered

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::{AutoDagError, Result};
use crate::rechunker::Rechunker;
use crate::stream::Stage;

/// AES-256-GCM key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size (12 bytes / 96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Bytes added to every frame
pub const FRAME_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Minimum salt length accepted by Argon2
pub const MIN_SALT_SIZE: usize = 8;

/// AES-256-GCM encryption key
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new random encryption key
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != KEY_SIZE {
            return Err(AutoDagError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(slice);
        Ok(Self(key))
    }

    /// Derive key from password and salt using Argon2
    pub fn derive_from_password(password: &[u8], salt: &[u8]) -> Result<Self> {
        if salt.len() < MIN_SALT_SIZE {
            return Err(AutoDagError::InvalidConfig(format!(
                "salt must be at least {} bytes",
                MIN_SALT_SIZE
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        argon2::Argon2::default()
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| AutoDagError::Encryption(e.to_string()))?;
        Ok(Self(key))
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| AutoDagError::Encryption(e.to_string()))
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        // Zeroize key on drop
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// Seal one frame: `nonce || ciphertext || tag`
pub fn encrypt_frame(cipher: &Aes256Gcm, index: u64, plaintext: &[u8]) -> Result<Bytes> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let aad = index.to_le_bytes();
    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| AutoDagError::Encryption(e.to_string()))?;

    let mut out = BytesMut::with_capacity(NONCE_SIZE + ciphertext.len());
    out.put_slice(&nonce);
    out.put_slice(&ciphertext);
    Ok(out.freeze())
}

/// Open one frame sealed by [`encrypt_frame`]
pub fn decrypt_frame(cipher: &Aes256Gcm, index: u64, frame: &[u8]) -> Result<Bytes> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(AutoDagError::Decryption(
            "Frame too short for encrypted content".to_string(),
        ));
    }
    let (nonce, ciphertext) = frame.split_at(NONCE_SIZE);
    let aad = index.to_le_bytes();
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| AutoDagError::Decryption(format!("Authentication failed for frame {}", index)))?;
    Ok(Bytes::from(plaintext))
}

/// Encrypting stage: frames plaintext into `chunk_size` pieces
pub struct Encryptor {
    cipher: Aes256Gcm,
    framer: Rechunker,
    index: u64,
}

impl Encryptor {
    pub fn new(key: &EncryptionKey, chunk_size: usize) -> Result<Self> {
        Ok(Self {
            cipher: key.cipher()?,
            framer: Rechunker::new(chunk_size)?,
            index: 0,
        })
    }

    fn seal(&mut self, frames: Vec<Bytes>) -> Result<Vec<Bytes>> {
        frames
            .into_iter()
            .map(|frame| {
                let sealed = encrypt_frame(&self.cipher, self.index, &frame)?;
                self.index += 1;
                Ok(sealed)
            })
            .collect()
    }
}

impl Stage for Encryptor {
    fn push(&mut self, input: Bytes) -> Result<Vec<Bytes>> {
        let frames = self.framer.push(input)?;
        self.seal(frames)
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        let frames = self.framer.finish()?;
        self.seal(frames)
    }
}

/// Decrypting stage: reads frames of `chunk_size + FRAME_OVERHEAD`
pub struct Decryptor {
    cipher: Aes256Gcm,
    framer: Rechunker,
    index: u64,
}

impl Decryptor {
    pub fn new(key: &EncryptionKey, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AutoDagError::InvalidConfig(
                "encryption chunk size must be positive".to_string(),
            ));
        }
        Ok(Self {
            cipher: key.cipher()?,
            framer: Rechunker::new(chunk_size + FRAME_OVERHEAD)?,
            index: 0,
        })
    }

    fn open(&mut self, frames: Vec<Bytes>) -> Result<Vec<Bytes>> {
        frames
            .into_iter()
            .map(|frame| {
                let plain = decrypt_frame(&self.cipher, self.index, &frame)?;
                self.index += 1;
                Ok(plain)
            })
            .collect()
    }
}

impl Stage for Decryptor {
    fn push(&mut self, input: Bytes) -> Result<Vec<Bytes>> {
        let frames = self.framer.push(input)?;
        self.open(frames)
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        let frames = self.framer.finish()?;
        self.open(frames)
    }
}
