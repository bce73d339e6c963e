//! Capabilities the host media stack exposes to the conformance drivers.
//!
//! The drivers never look inside the host: they issue operations through
//! these traits and observe progress through broadcast event channels. A
//! browser binding, a native player or the simulated host in `msecheck-sim`
//! can all sit behind the same seam.

mod events;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;

pub use events::{BufferEvent, MediaEvent, UpdateCompletion, wait_update_end};

use crate::fetch::Fetcher;
use crate::time_ranges::TimeRanges;

/// Errors raised synchronously by host operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// An append or remove was issued while another one is still updating.
    #[error("buffer busy: {0}")]
    Busy(String),

    /// The object is in the wrong state for the call.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("media source is closed")]
    Closed,
}

impl HostError {
    /// Whether this is the busy condition of a buffer with an operation in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, HostError::Busy(_))
    }
}

/// Readiness of the media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceReadyState {
    Closed,
    Open,
    Ended,
}

/// Readiness of the media element, mirroring `HTMLMediaElement.readyState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

/// A segmented append buffer for one mime type.
///
/// At most one append or remove may be in flight; issuing another while
/// [`SourceBuffer::updating`] is true fails with [`HostError::Busy`].
/// Operations return immediately and complete asynchronously, signalled by
/// `Update`/`Error` followed by `UpdateEnd`.
pub trait SourceBuffer: Send + Sync {
    fn mime_type(&self) -> &str;

    /// Starts appending `data`.
    ///
    /// # Errors
    ///
    /// - `HostError::Busy` - An operation is already in flight
    /// - `HostError::Closed` - The owning media source is not open
    fn append_buffer(&self, data: Bytes) -> Result<(), HostError>;

    /// Aborts the in-flight operation and resets the segment parser.
    ///
    /// # Errors
    ///
    /// - `HostError::Closed` - The owning media source is not open
    fn abort(&self) -> Result<(), HostError>;

    /// Starts removing `[start, end)` from the buffered ranges.
    ///
    /// # Errors
    ///
    /// - `HostError::Busy` - An operation is already in flight
    /// - `HostError::InvalidState` - The range is empty or negative
    fn remove(&self, start: f64, end: f64) -> Result<(), HostError>;

    fn buffered(&self) -> TimeRanges;

    fn timestamp_offset(&self) -> f64;

    /// Sets the offset applied to subsequently appended media segments.
    ///
    /// # Errors
    ///
    /// - `HostError::InvalidState` - The buffer is updating
    fn set_timestamp_offset(&self, offset: f64) -> Result<(), HostError>;

    fn updating(&self) -> bool;

    /// Subscribes to buffer events. Events sent before subscribing are not seen.
    fn subscribe(&self) -> broadcast::Receiver<BufferEvent>;
}

/// The playback element the media source is attached to.
pub trait MediaElement: Send + Sync {
    fn current_time(&self) -> f64;

    /// Seeks the element; fires `Seeking` then `Seeked`.
    fn set_current_time(&self, time: f64);

    /// Element duration; NaN until metadata is known.
    fn duration(&self) -> f64;

    fn paused(&self) -> bool;

    fn play(&self);

    fn pause(&self);

    fn video_width(&self) -> u32;

    fn video_height(&self) -> u32;

    fn ready_state(&self) -> ElementReadyState;

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;
}

/// Segmented media source attached to a [`MediaElement`].
pub trait MediaSource: Send + Sync {
    fn ready_state(&self) -> SourceReadyState;

    fn duration(&self) -> f64;

    /// Sets the presentation duration.
    ///
    /// Reducing the duration below buffered data truncates every affected
    /// buffer, which then updates asynchronously.
    ///
    /// # Errors
    ///
    /// - `HostError::InvalidState` - A buffer is updating or the source is not open
    fn set_duration(&self, duration: f64) -> Result<(), HostError>;

    /// Creates a buffer for `type_string` (mime type with codecs).
    ///
    /// # Errors
    ///
    /// - `HostError::NotSupported` - The type cannot be played
    /// - `HostError::InvalidState` - The source is not open
    fn add_source_buffer(&self, type_string: &str) -> Result<Arc<dyn SourceBuffer>, HostError>;

    /// Signals that no more data will be appended.
    ///
    /// # Errors
    ///
    /// - `HostError::InvalidState` - The source is not open or a buffer is updating
    fn end_of_stream(&self) -> Result<(), HostError>;
}

/// An open playback context: element plus attached media source.
#[derive(Clone)]
pub struct PlaybackContext {
    pub element: Arc<dyn MediaElement>,
    pub media_source: Arc<dyn MediaSource>,
}

/// Entry point to a host implementation.
#[async_trait]
pub trait Host: Send + Sync {
    /// Human readable host name for reports.
    fn name(&self) -> &str;

    /// Whether segmented append is available at all.
    fn supports_media_source(&self) -> bool;

    fn is_type_supported(&self, type_string: &str) -> bool;

    /// Opens a fresh playback context, resolving once the source is open.
    ///
    /// # Errors
    ///
    /// - `HostError::NotSupported` - Segmented append is unavailable
    async fn open(&self) -> Result<PlaybackContext, HostError>;

    /// Fetcher used to load stream fixtures.
    fn fetcher(&self) -> Arc<dyn Fetcher>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_variant_is_busy() {
        assert!(HostError::Busy("append while updating".to_string()).is_busy());
        assert!(!HostError::InvalidState("source buffer was removed".to_string()).is_busy());
        assert!(!HostError::Closed.is_busy());
        assert!(!HostError::QuotaExceeded.is_busy());
    }
}
