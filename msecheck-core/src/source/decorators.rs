//! Interface-preserving adapters over a [`SegmentSource`].
//!
//! Each adapter owns exactly one inner source, forming a linear chain whose
//! outermost link is the only handle a test holds.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{SegmentSource, SourceError};
use crate::host::SourceBuffer;
use crate::stream::StreamDescriptor;

/// Re-chunks media output into pieces of exactly `min(remaining, max_size)` bytes.
///
/// Pulls from the inner source as often as needed and splits or joins its
/// chunks. Byte order and total byte count are preserved.
pub struct FixedChunkSize<S> {
    inner: S,
    max_size: usize,
    pending: BytesMut,
}

impl<S: SegmentSource> FixedChunkSize<S> {
    pub fn new(inner: S, max_size: usize) -> Self {
        Self {
            inner,
            max_size: max_size.max(1),
            pending: BytesMut::new(),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: SegmentSource> SegmentSource for FixedChunkSize<S> {
    fn descriptor(&self) -> &Arc<StreamDescriptor> {
        self.inner.descriptor()
    }

    async fn init(&mut self, window_end: Option<u64>) -> Result<Bytes, SourceError> {
        self.inner.init(window_end).await
    }

    async fn pull(&mut self) -> Result<Bytes, SourceError> {
        while self.pending.len() < self.max_size && !self.inner.is_exhausted() {
            let chunk = self.inner.pull().await?;
            self.pending.extend_from_slice(&chunk);
        }

        if self.pending.is_empty() {
            return Err(SourceError::Exhausted {
                url: self.inner.descriptor().url.clone(),
                offset: self.inner.position(),
            });
        }

        let take = self.pending.len().min(self.max_size);
        Ok(self.pending.split_to(take).freeze())
    }

    async fn seek(
        &mut self,
        time: f64,
        buffer: Option<&dyn SourceBuffer>,
    ) -> Result<(), SourceError> {
        self.pending.clear();
        self.inner.seek(time, buffer).await
    }

    fn is_exhausted(&self) -> bool {
        self.pending.is_empty() && self.inner.is_exhausted()
    }

    fn position(&self) -> u64 {
        self.inner.position() - self.pending.len() as u64
    }
}

/// Rewinds the inner source to time zero before delegating `init`.
///
/// Repeated `init` calls are idempotent even after media was pulled.
pub struct ResetBeforeInit<S> {
    inner: S,
}

impl<S: SegmentSource> ResetBeforeInit<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: SegmentSource> SegmentSource for ResetBeforeInit<S> {
    fn descriptor(&self) -> &Arc<StreamDescriptor> {
        self.inner.descriptor()
    }

    async fn init(&mut self, window_end: Option<u64>) -> Result<Bytes, SourceError> {
        self.inner.seek(0.0, None).await?;
        self.inner.init(window_end).await
    }

    async fn pull(&mut self) -> Result<Bytes, SourceError> {
        self.inner.pull().await
    }

    async fn seek(
        &mut self,
        time: f64,
        buffer: Option<&dyn SourceBuffer>,
    ) -> Result<(), SourceError> {
        self.inner.seek(time, buffer).await
    }

    fn is_exhausted(&self) -> bool {
        self.inner.is_exhausted()
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }
}

/// Yields at most `limit` media chunks, then reports exhaustion.
///
/// Seeking resets the count.
pub struct SegmentLimit<S> {
    inner: S,
    limit: usize,
    yielded: usize,
}

impl<S: SegmentSource> SegmentLimit<S> {
    pub fn new(inner: S, limit: usize) -> Self {
        Self {
            inner,
            limit,
            yielded: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.yielded)
    }
}

#[async_trait]
impl<S: SegmentSource> SegmentSource for SegmentLimit<S> {
    fn descriptor(&self) -> &Arc<StreamDescriptor> {
        self.inner.descriptor()
    }

    async fn init(&mut self, window_end: Option<u64>) -> Result<Bytes, SourceError> {
        self.inner.init(window_end).await
    }

    async fn pull(&mut self) -> Result<Bytes, SourceError> {
        if self.yielded >= self.limit {
            return Err(SourceError::Exhausted {
                url: self.inner.descriptor().url.clone(),
                offset: self.inner.position(),
            });
        }
        let chunk = self.inner.pull().await?;
        self.yielded += 1;
        Ok(chunk)
    }

    async fn seek(
        &mut self,
        time: f64,
        buffer: Option<&dyn SourceBuffer>,
    ) -> Result<(), SourceError> {
        self.yielded = 0;
        self.inner.seek(time, buffer).await
    }

    fn is_exhausted(&self) -> bool {
        self.yielded >= self.limit || self.inner.is_exhausted()
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }
}

/// Starts media delivery at the segment holding `start_time`.
///
/// The inner source is positioned lazily on the first `pull` after
/// construction or `init`, so the init chunk is still read from the start of
/// the resource. An explicit `seek` replaces the pending start.
pub struct SeekToSegment<S> {
    inner: S,
    start_time: f64,
    pending: bool,
}

impl<S: SegmentSource> SeekToSegment<S> {
    pub fn new(inner: S, start_time: f64) -> Self {
        Self {
            inner,
            start_time,
            pending: true,
        }
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }
}

#[async_trait]
impl<S: SegmentSource> SegmentSource for SeekToSegment<S> {
    fn descriptor(&self) -> &Arc<StreamDescriptor> {
        self.inner.descriptor()
    }

    async fn init(&mut self, window_end: Option<u64>) -> Result<Bytes, SourceError> {
        let chunk = self.inner.init(window_end).await?;
        self.pending = true;
        Ok(chunk)
    }

    async fn pull(&mut self) -> Result<Bytes, SourceError> {
        if self.pending {
            self.inner.seek(self.start_time, None).await?;
            self.pending = false;
        }
        self.inner.pull().await
    }

    async fn seek(
        &mut self,
        time: f64,
        buffer: Option<&dyn SourceBuffer>,
    ) -> Result<(), SourceError> {
        self.pending = false;
        self.inner.seek(time, buffer).await
    }

    fn is_exhausted(&self) -> bool {
        !self.pending && self.inner.is_exhausted()
    }

    fn position(&self) -> u64 {
        if self.pending {
            return self.inner.descriptor().offset_for_time(self.start_time);
        }
        self.inner.position()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::source::{RangeSource, SourceExt};
    use crate::test_support::{MemoryFetcher, synthetic_stream};

    async fn drain(source: &mut dyn SegmentSource) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        while !source.is_exhausted() {
            chunks.push(source.pull().await.unwrap());
        }
        chunks
    }

    fn source_over(segments: usize, segment_size: usize) -> (RangeSource, Bytes) {
        let (descriptor, data) = synthetic_stream("sim://chunked", 32, segments, segment_size);
        let fetcher = Arc::new(MemoryFetcher::new().with_resource("sim://chunked", data.clone()));
        (RangeSource::new(Arc::new(descriptor), fetcher, 64), data)
    }

    #[tokio::test]
    async fn test_fixed_chunk_size_splits_large_segments() {
        let (base, data) = source_over(3, 100);
        let mut source = base.fixed_chunk_size(40);

        let chunks = drain(&mut source).await;
        let lengths: Vec<usize> = chunks.iter().map(Bytes::len).collect();

        assert_eq!(lengths, vec![40, 40, 40, 40, 40, 40, 40, 20]);
        assert_eq!(chunks.concat(), data[32..].to_vec());
    }

    #[tokio::test]
    async fn test_fixed_chunk_size_joins_small_segments() {
        let (base, _) = source_over(5, 10);
        let mut source = base.fixed_chunk_size(25);

        let lengths: Vec<usize> = drain(&mut source).await.iter().map(Bytes::len).collect();
        assert_eq!(lengths, vec![25, 25]);
    }

    #[tokio::test]
    async fn test_fixed_chunk_size_reports_exhaustion() {
        let (base, _) = source_over(1, 10);
        let mut source = base.fixed_chunk_size(64);

        source.pull().await.unwrap();
        assert!(source.is_exhausted());
        assert!(source.pull().await.unwrap_err().is_exhausted());
    }

    #[tokio::test]
    async fn test_reset_before_init_rewinds_cursor() {
        let (base, _) = source_over(4, 50);
        let mut source = base.reset_before_init();

        let first_init = source.init(None).await.unwrap();
        let start = source.position();
        source.pull().await.unwrap();
        source.pull().await.unwrap();
        assert!(source.position() > start);

        let second_init = source.init(None).await.unwrap();
        assert_eq!(first_init, second_init);
        assert_eq!(source.position(), start);
    }

    #[tokio::test]
    async fn test_segment_limit_stops_early_and_resets_on_seek() {
        let (base, _) = source_over(6, 20);
        let mut source = base.segment_limit(2);

        assert_eq!(drain(&mut source).await.len(), 2);
        assert!(source.pull().await.unwrap_err().is_exhausted());

        source.seek(0.0, None).await.unwrap();
        assert_eq!(source.remaining(), 2);
        assert_eq!(drain(&mut source).await.len(), 2);
    }

    #[tokio::test]
    async fn test_seek_to_segment_skips_leading_media() {
        let (base, data) = source_over(5, 40);
        let mut source = base.seek_to_segment(3.2);

        let init = source.init(None).await.unwrap();
        assert_eq!(init, data.slice(0..32));
        assert_eq!(source.position(), 32 + 3 * 40);

        let chunks = drain(&mut source).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), data[32 + 3 * 40..].to_vec());
    }

    #[tokio::test]
    async fn test_seek_to_segment_yields_to_explicit_seek() {
        let (base, data) = source_over(5, 40);
        let mut source = base.seek_to_segment(4.0);

        source.seek(1.0, None).await.unwrap();
        assert_eq!(source.pull().await.unwrap(), data.slice(72..112));
    }

    #[tokio::test]
    async fn test_decorator_stack_is_substitutable_for_bare_source() {
        let (bare, _) = source_over(4, 30);
        let (stacked, _) = source_over(4, 30);

        let mut bare: Box<dyn SegmentSource> = bare.boxed();
        let mut stacked: Box<dyn SegmentSource> =
            stacked.fixed_chunk_size(1000).reset_before_init().boxed();

        let bare_bytes = drain(bare.as_mut()).await.concat();
        let stacked_bytes = drain(stacked.as_mut()).await.concat();
        assert_eq!(bare_bytes, stacked_bytes);
    }

    proptest! {
        #[test]
        fn prop_fixed_chunk_size_preserves_stream(
            segments in 1usize..12,
            segment_size in 1usize..200,
            max_size in 1usize..300,
        ) {
            let (base, data) = source_over(segments, segment_size);
            let mut source = base.fixed_chunk_size(max_size);
            let chunks = tokio_test::block_on(drain(&mut source));

            let (last, rest) = chunks.split_last().unwrap();
            prop_assert!(rest.iter().all(|c| c.len() == max_size));
            prop_assert!(!last.is_empty() && last.len() <= max_size);
            prop_assert_eq!(chunks.concat(), data[32..].to_vec());
        }

        #[test]
        fn prop_seek_zero_replays_identically(
            segments in 1usize..10,
            segment_size in 1usize..120,
            pulled_before_seek in 0usize..10,
        ) {
            let (mut fresh, _) = source_over(segments, segment_size);
            let (mut reused, _) = source_over(segments, segment_size);

            tokio_test::block_on(async {
                reused.init(None).await.unwrap();
                for _ in 0..pulled_before_seek.min(segments) {
                    reused.pull().await.unwrap();
                }
                reused.seek(0.0, None).await.unwrap();

                let fresh_init = fresh.init(None).await.unwrap();
                let reused_init = reused.init(None).await.unwrap();
                assert_eq!(fresh_init, reused_init);
                assert_eq!(drain(&mut fresh).await, drain(&mut reused).await);
            });
        }
    }
}
