//! Fixed-size re-framing of arbitrary byte streams
//!
//! Upstream buffers arrive with arbitrary boundaries; the rechunker emits
//! chunks of exactly `chunk_size` bytes. Only the bytes that do not yet make
//! a whole chunk are held back, so at most `chunk_size - 1` bytes are pending
//! between pushes.

use bytes::{Bytes, BytesMut};

use crate::error::{AutoDagError, Result};
use crate::stream::{ByteSourceExt, Stage, StageIter};

/// Re-frames pushed buffers into fixed-size chunks
#[derive(Debug)]
pub struct Rechunker {
    chunk_size: usize,
    ignore_last_chunk: bool,
    pending: BytesMut,
}

impl Rechunker {
    /// Create a rechunker; `chunk_size` must be positive
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AutoDagError::InvalidConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            ignore_last_chunk: false,
            pending: BytesMut::new(),
        })
    }

    /// Hold a short final chunk instead of emitting it
    pub fn ignore_last_chunk(mut self, ignore: bool) -> Self {
        self.ignore_last_chunk = ignore;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes currently held back
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Take the held remainder (non-empty only after `finish` with
    /// `ignore_last_chunk` set)
    pub fn take_remainder(&mut self) -> Bytes {
        self.pending.split().freeze()
    }
}

impl Stage for Rechunker {
    fn push(&mut self, mut input: Bytes) -> Result<Vec<Bytes>> {
        let mut out = Vec::new();

        if !self.pending.is_empty() {
            let needed = self.chunk_size - self.pending.len();
            if input.len() < needed {
                self.pending.extend_from_slice(&input);
                return Ok(out);
            }
            self.pending.extend_from_slice(&input.split_to(needed));
            out.push(self.pending.split().freeze());
        }

        // Whole chunks straight out of the input, zero-copy
        while input.len() >= self.chunk_size {
            out.push(input.split_to(self.chunk_size));
        }

        if !input.is_empty() {
            self.pending.extend_from_slice(&input);
        }

        Ok(out)
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        if self.pending.is_empty() || self.ignore_last_chunk {
            return Ok(Vec::new());
        }
        Ok(vec![self.pending.split().freeze()])
    }
}

/// Lazily re-frame `source` into `chunk_size` chunks
pub fn rechunk<I>(source: I, chunk_size: usize) -> Result<StageIter<I, Rechunker>>
where
    I: Iterator<Item = Result<Bytes>>,
{
    Ok(source.through(Rechunker::new(chunk_size)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::bytes_source;
    use proptest::prelude::*;

    fn chunk_lengths(data: Vec<u8>, buffer: usize, chunk_size: usize) -> Vec<usize> {
        rechunk(bytes_source(data, buffer), chunk_size)
            .unwrap()
            .map(|c| c.unwrap().len())
            .collect()
    }

    #[test]
    fn test_zero_chunk_size() {
        assert!(matches!(
            Rechunker::new(0),
            Err(AutoDagError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(chunk_lengths(Vec::new(), 4, 16).is_empty());
    }

    #[test]
    fn test_exact_multiple() {
        assert_eq!(chunk_lengths(vec![1; 48], 7, 16), vec![16, 16, 16]);
    }

    #[test]
    fn test_short_tail() {
        assert_eq!(chunk_lengths(vec![1; 35], 3, 16), vec![16, 16, 3]);
    }

    #[test]
    fn test_large_buffers_split_without_pending() {
        let mut chunker = Rechunker::new(4).unwrap();
        let out = chunker.push(Bytes::from(vec![9u8; 10])).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(chunker.pending_len(), 2);
    }

    #[test]
    fn test_pending_never_reaches_chunk_size() {
        let mut chunker = Rechunker::new(5).unwrap();
        for size in [1, 2, 3, 7, 4, 11, 1] {
            chunker.push(Bytes::from(vec![0u8; size])).unwrap();
            assert!(chunker.pending_len() < 5);
        }
    }

    #[test]
    fn test_ignore_last_chunk_holds_tail() {
        let mut chunker = Rechunker::new(4).unwrap().ignore_last_chunk(true);
        let out = chunker.push(Bytes::from_static(b"abcdef")).unwrap();
        assert_eq!(out, vec![Bytes::from_static(b"abcd")]);
        assert!(chunker.finish().unwrap().is_empty());
        assert_eq!(chunker.take_remainder().as_ref(), b"ef");
        assert_eq!(chunker.pending_len(), 0);
    }

    #[test]
    fn test_content_preserved_in_order() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let chunks: Vec<Bytes> = rechunk(bytes_source(data.clone(), 33), 64)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(chunks.concat(), data);
    }

    proptest! {
        #[test]
        fn prop_chunk_counts(n in 0usize..2000, k in 1usize..100, buffer in 1usize..300) {
            let lengths = chunk_lengths(vec![0xAB; n], buffer, k);
            prop_assert_eq!(lengths.len(), (n + k - 1) / k);
            let full = n / k;
            prop_assert!(lengths[..full].iter().all(|&len| len == k));
            if n % k != 0 {
                prop_assert_eq!(lengths[full], n % k);
            }
        }
    }
}
