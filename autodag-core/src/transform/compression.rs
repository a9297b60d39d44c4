//! Streaming zstd compression stages

use std::io::Write;

use bytes::Bytes;
use zstd::stream::write::{Decoder, Encoder};

use crate::error::{AutoDagError, Result};
use crate::rechunker::Rechunker;
use crate::stream::Stage;

/// Highest accepted compression level
pub const MAX_LEVEL: u32 = 9;

fn compression_error(e: std::io::Error) -> AutoDagError {
    AutoDagError::Compression(e.to_string())
}

/// Compressing stage; output is re-framed into `chunk_size` buffers
pub struct Compressor {
    encoder: Option<Encoder<'static, Vec<u8>>>,
    framer: Rechunker,
}

impl Compressor {
    pub fn new(level: u32, chunk_size: usize) -> Result<Self> {
        if level > MAX_LEVEL {
            return Err(AutoDagError::InvalidConfig(format!(
                "compression level {} out of range 0-{}",
                level, MAX_LEVEL
            )));
        }
        let encoder = Encoder::new(Vec::new(), level as i32).map_err(compression_error)?;
        Ok(Self {
            encoder: Some(encoder),
            framer: Rechunker::new(chunk_size)?,
        })
    }

    fn encoder(&mut self) -> Result<&mut Encoder<'static, Vec<u8>>> {
        self.encoder
            .as_mut()
            .ok_or_else(|| AutoDagError::Compression("compressor already finished".to_string()))
    }
}

impl Stage for Compressor {
    fn push(&mut self, input: Bytes) -> Result<Vec<Bytes>> {
        let encoder = self.encoder()?;
        encoder.write_all(&input).map_err(compression_error)?;
        let produced = std::mem::take(encoder.get_mut());
        if produced.is_empty() {
            return Ok(Vec::new());
        }
        self.framer.push(Bytes::from(produced))
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| AutoDagError::Compression("compressor already finished".to_string()))?;
        let tail = encoder.finish().map_err(compression_error)?;
        let mut out = self.framer.push(Bytes::from(tail))?;
        out.extend(self.framer.finish()?);
        Ok(out)
    }
}

/// Decompressing stage
pub struct Decompressor {
    decoder: Option<Decoder<'static, Vec<u8>>>,
}

impl Decompressor {
    pub fn new() -> Result<Self> {
        let decoder = Decoder::new(Vec::new()).map_err(compression_error)?;
        Ok(Self {
            decoder: Some(decoder),
        })
    }
}

impl Stage for Decompressor {
    fn push(&mut self, input: Bytes) -> Result<Vec<Bytes>> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| AutoDagError::Compression("decompressor already finished".to_string()))?;
        decoder.write_all(&input).map_err(compression_error)?;
        let produced = std::mem::take(decoder.get_mut());
        if produced.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Bytes::from(produced)])
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        let mut decoder = self
            .decoder
            .take()
            .ok_or_else(|| AutoDagError::Compression("decompressor already finished".to_string()))?;
        decoder.flush().map_err(compression_error)?;
        let tail = decoder.into_inner();
        if tail.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Bytes::from(tail)])
    }
}
