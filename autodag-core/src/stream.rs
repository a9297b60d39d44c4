//! Pull-based byte pipelines
//!
//! Byte sources are plain iterators of `Result<Bytes>`. Every processing step
//! (rechunking, compression, encryption) is a push-driven [`Stage`]; the
//! [`StageIter`] adapter turns a stage into a lazy iterator that pulls from
//! its upstream only when its own output queue is empty. The same stages are
//! driven directly by the async importer.

use std::collections::VecDeque;
use std::io::Read;

use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;

use crate::error::{AutoDagError, Result};

/// A lazy sequence of byte buffers
pub type ByteStream<'a> = Box<dyn Iterator<Item = Result<Bytes>> + Send + 'a>;

/// One push-driven processing step
pub trait Stage: Send {
    /// Feed one upstream buffer, returning whatever output is ready
    fn push(&mut self, input: Bytes) -> Result<Vec<Bytes>>;

    /// Upstream is exhausted; flush remaining output
    fn finish(&mut self) -> Result<Vec<Bytes>>;
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn push(&mut self, input: Bytes) -> Result<Vec<Bytes>> {
        (**self).push(input)
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        (**self).finish()
    }
}

/// Stages applied one after another
#[derive(Default)]
pub struct StageChain {
    stages: Vec<Box<dyn Stage>>,
}

impl StageChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

impl Stage for StageChain {
    fn push(&mut self, input: Bytes) -> Result<Vec<Bytes>> {
        let mut buffers = vec![input];
        for stage in &mut self.stages {
            let mut next = Vec::new();
            for buffer in buffers {
                next.extend(stage.push(buffer)?);
            }
            buffers = next;
        }
        Ok(buffers)
    }

    fn finish(&mut self) -> Result<Vec<Bytes>> {
        // Each stage's tail must flow through every stage after it.
        let mut carried: Vec<Bytes> = Vec::new();
        for stage in &mut self.stages {
            let mut next = Vec::new();
            for buffer in carried {
                next.extend(stage.push(buffer)?);
            }
            next.extend(stage.finish()?);
            carried = next;
        }
        Ok(carried)
    }
}

/// Iterator adapter driving a [`Stage`] from an upstream byte source
pub struct StageIter<I, S> {
    upstream: I,
    stage: S,
    ready: VecDeque<Bytes>,
    done: bool,
}

impl<I, S> StageIter<I, S>
where
    I: Iterator<Item = Result<Bytes>>,
    S: Stage,
{
    pub fn new(upstream: I, stage: S) -> Self {
        Self {
            upstream,
            stage,
            ready: VecDeque::new(),
            done: false,
        }
    }

    /// Access the stage, e.g. to recover a held remainder
    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    fn fail(&mut self, err: AutoDagError) -> Option<Result<Bytes>> {
        self.done = true;
        self.ready.clear();
        Some(Err(err))
    }
}

impl<I, S> Iterator for StageIter<I, S>
where
    I: Iterator<Item = Result<Bytes>>,
    S: Stage,
{
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(buffer) = self.ready.pop_front() {
                return Some(Ok(buffer));
            }
            if self.done {
                return None;
            }
            match self.upstream.next() {
                Some(Ok(input)) => match self.stage.push(input) {
                    Ok(out) => self.ready.extend(out),
                    Err(e) => return self.fail(e),
                },
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    match self.stage.finish() {
                        Ok(out) => self.ready.extend(out),
                        Err(e) => return self.fail(e),
                    }
                }
            }
        }
    }
}

/// Iterator adapter that stops pulling once a cancellation token fires
pub struct Abortable<I> {
    upstream: I,
    token: CancellationToken,
    aborted: bool,
}

impl<I> Iterator for Abortable<I>
where
    I: Iterator<Item = Result<Bytes>>,
{
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.aborted {
            return None;
        }
        if self.token.is_cancelled() {
            self.aborted = true;
            return Some(Err(AutoDagError::Cancelled));
        }
        self.upstream.next()
    }
}

/// Combinators for byte sources
pub trait ByteSourceExt: Iterator<Item = Result<Bytes>> + Sized {
    /// Run the source through a stage
    fn through<S: Stage>(self, stage: S) -> StageIter<Self, S> {
        StageIter::new(self, stage)
    }

    /// Stop with [`AutoDagError::Cancelled`] once `token` is cancelled
    fn abortable(self, token: CancellationToken) -> Abortable<Self> {
        Abortable {
            upstream: self,
            token,
            aborted: false,
        }
    }
}

impl<I> ByteSourceExt for I where I: Iterator<Item = Result<Bytes>> + Sized {}

/// Byte source over in-memory content, split into `buffer_size` pieces
pub fn bytes_source(data: impl Into<Bytes>, buffer_size: usize) -> ByteStream<'static> {
    let mut data: Bytes = data.into();
    let buffer_size = buffer_size.max(1);
    Box::new(std::iter::from_fn(move || {
        if data.is_empty() {
            return None;
        }
        let take = buffer_size.min(data.len());
        Some(Ok(data.split_to(take)))
    }))
}

/// Byte source reading from any `Read` in buffers of up to `buffer_size`
pub fn read_source<'a, R>(reader: R, buffer_size: usize) -> ByteStream<'a>
where
    R: Read + Send + 'a,
{
    Box::new(ReadSource {
        reader,
        buffer: BytesMut::new(),
        buffer_size: buffer_size.max(1),
        done: false,
    })
}

struct ReadSource<R> {
    reader: R,
    buffer: BytesMut,
    buffer_size: usize,
    done: bool,
}

impl<R: Read> Iterator for ReadSource<R> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.buffer.resize(self.buffer_size, 0);
        loop {
            match self.reader.read(&mut self.buffer) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => return Some(Ok(self.buffer.split_to(n).freeze())),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/// Drain a byte source into one buffer
pub fn collect_bytes<I>(source: I) -> Result<Bytes>
where
    I: Iterator<Item = Result<Bytes>>,
{
    let mut out = BytesMut::new();
    for buffer in source {
        out.extend_from_slice(&buffer?);
    }
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Doubles every byte, emits a marker on finish
    struct Doubler;

    impl Stage for Doubler {
        fn push(&mut self, input: Bytes) -> Result<Vec<Bytes>> {
            Ok(vec![Bytes::from(
                input.iter().flat_map(|b| [*b, *b]).collect::<Vec<u8>>(),
            )])
        }

        fn finish(&mut self) -> Result<Vec<Bytes>> {
            Ok(vec![Bytes::from_static(b"!")])
        }
    }

    #[test]
    fn test_stage_iter_flushes_on_finish() {
        let out = collect_bytes(bytes_source(&b"ab"[..], 1).through(Doubler)).unwrap();
        assert_eq!(out.as_ref(), b"aabb!");
    }

    #[test]
    fn test_chain_carries_tails_downstream() {
        let chain = StageChain::new().then(Doubler).then(Doubler);
        let out = collect_bytes(bytes_source(&b"a"[..], 4).through(chain)).unwrap();
        // "a" -> "aa" -> "aaaa"; first tail "!" -> "!!"; second tail "!"
        assert_eq!(out.as_ref(), b"aaaa!!!");
    }

    #[test]
    fn test_upstream_error_stops_iteration() {
        let source = vec![
            Ok(Bytes::from_static(b"x")),
            Err(AutoDagError::Storage("boom".into())),
            Ok(Bytes::from_static(b"y")),
        ];
        let mut iter = source.into_iter().through(Doubler);
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_abortable() {
        let token = CancellationToken::new();
        let mut iter = bytes_source(vec![0u8; 10], 2).abortable(token.clone());
        assert!(iter.next().unwrap().is_ok());
        token.cancel();
        assert!(matches!(iter.next(), Some(Err(AutoDagError::Cancelled))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_read_source() {
        let data: Vec<u8> = (0..100u8).collect();
        let buffers: Vec<Bytes> = read_source(std::io::Cursor::new(data.clone()), 30)
            .collect::<Result<_>>()
            .unwrap();
        assert!(buffers.iter().all(|b| b.len() <= 30));
        assert_eq!(buffers.concat(), data);
    }

    #[test]
    fn test_empty_sources() {
        assert_eq!(bytes_source(Bytes::new(), 8).count(), 0);
        assert_eq!(read_source(std::io::empty(), 8).count(), 0);
    }
}
