//! Segment sources: remote media delivered as an init chunk followed by a
//! restartable sequence of media chunks.
//!
//! [`RangeSource`] is the base implementation over a [`Fetcher`](crate::fetch::Fetcher).
//! Decorators in [`decorators`] wrap any [`SegmentSource`] by value and expose
//! the same contract, so a test written against a bare source runs unchanged
//! against any decorator stack.

pub mod decorators;
mod range;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use decorators::{FixedChunkSize, ResetBeforeInit, SeekToSegment, SegmentLimit};
pub use range::RangeSource;

use crate::fetch::FetchError;
use crate::host::{HostError, SourceBuffer};
use crate::stream::StreamDescriptor;

/// Errors that can occur while pulling from a segment source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// `pull` was called after the last media chunk
    #[error("source exhausted at byte {offset} of {url}")]
    Exhausted { url: String, offset: u64 },

    #[error("buffer rejected seek cleanup: {0}")]
    Host(#[from] HostError),

    /// The buffer reported an error while being cleared for a seek
    #[error("buffer cleanup failed: {reason}")]
    BufferCleanup { reason: String },
}

impl SourceError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, SourceError::Exhausted { .. })
    }
}

/// The three-operation contract shared by sources and their decorators.
#[async_trait]
pub trait SegmentSource: Send {
    /// Descriptor of the resource being delivered.
    fn descriptor(&self) -> &Arc<StreamDescriptor>;

    /// Fetches the initialization chunk, `[0, init_size)` or `[0, window_end)`.
    ///
    /// # Errors
    ///
    /// - `SourceError::Fetch` - The range request failed
    async fn init(&mut self, window_end: Option<u64>) -> Result<Bytes, SourceError>;

    /// Fetches the next media chunk and advances the cursor past it.
    ///
    /// # Errors
    ///
    /// - `SourceError::Exhausted` - No media remains
    /// - `SourceError::Fetch` - The range request failed
    async fn pull(&mut self) -> Result<Bytes, SourceError>;

    /// Moves the cursor to the chunk holding `time`.
    ///
    /// When `buffer` is given it is aborted and cleared first, so stale
    /// in-flight state cannot corrupt the appends that follow.
    ///
    /// # Errors
    ///
    /// - `SourceError::Host` - The buffer rejected abort or remove
    /// - `SourceError::BufferCleanup` - The removal completed with an error
    async fn seek(
        &mut self,
        time: f64,
        buffer: Option<&dyn SourceBuffer>,
    ) -> Result<(), SourceError>;

    /// Whether the next `pull` would report exhaustion.
    fn is_exhausted(&self) -> bool;

    /// Current byte cursor of the underlying resource.
    fn position(&self) -> u64;
}

#[async_trait]
impl<S: SegmentSource + ?Sized> SegmentSource for Box<S> {
    fn descriptor(&self) -> &Arc<StreamDescriptor> {
        (**self).descriptor()
    }

    async fn init(&mut self, window_end: Option<u64>) -> Result<Bytes, SourceError> {
        (**self).init(window_end).await
    }

    async fn pull(&mut self) -> Result<Bytes, SourceError> {
        (**self).pull().await
    }

    async fn seek(
        &mut self,
        time: f64,
        buffer: Option<&dyn SourceBuffer>,
    ) -> Result<(), SourceError> {
        (**self).seek(time, buffer).await
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }
}

/// Builder-style helpers for stacking decorators.
pub trait SourceExt: SegmentSource + Sized + 'static {
    /// Re-chunks output into pieces of at most `max_size` bytes.
    fn fixed_chunk_size(self, max_size: usize) -> FixedChunkSize<Self> {
        FixedChunkSize::new(self, max_size)
    }

    /// Rewinds to the start before every `init`.
    fn reset_before_init(self) -> ResetBeforeInit<Self> {
        ResetBeforeInit::new(self)
    }

    /// Delivers media from the segment holding `start_time`.
    fn seek_to_segment(self, start_time: f64) -> SeekToSegment<Self> {
        SeekToSegment::new(self, start_time)
    }

    /// Stops after `limit` media chunks.
    fn segment_limit(self, limit: usize) -> SegmentLimit<Self> {
        SegmentLimit::new(self, limit)
    }

    fn boxed(self) -> Box<dyn SegmentSource> {
        Box::new(self)
    }
}

impl<S: SegmentSource + Sized + 'static> SourceExt for S {}
