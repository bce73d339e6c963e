//! Base segment source reading a resource through byte-range requests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::{SegmentSource, SourceError};
use crate::fetch::Fetcher;
use crate::host::{SourceBuffer, UpdateCompletion, wait_update_end};
use crate::stream::StreamDescriptor;

/// Cursor over one remote resource.
///
/// Media chunks follow the descriptor's segment table when it has one and
/// fall back to fixed `pull_size` reads otherwise.
pub struct RangeSource {
    descriptor: Arc<StreamDescriptor>,
    fetcher: Arc<dyn Fetcher>,
    pull_size: u64,
    cursor: u64,
    init_end: u64,
    total_size: u64,
    init_chunk: Option<Bytes>,
}

impl RangeSource {
    pub fn new(
        descriptor: Arc<StreamDescriptor>,
        fetcher: Arc<dyn Fetcher>,
        pull_size: u64,
    ) -> Self {
        let init_end = descriptor.init_size;
        let total_size = descriptor.size;
        Self {
            descriptor,
            fetcher,
            pull_size: pull_size.max(1),
            cursor: init_end,
            init_end,
            total_size,
            init_chunk: None,
        }
    }

    fn next_chunk_end(&self) -> u64 {
        let end = self
            .descriptor
            .segments
            .iter()
            .find(|s| s.end_offset() > self.cursor)
            .map(|s| s.end_offset())
            .unwrap_or(self.cursor + self.pull_size);
        end.min(self.total_size)
    }
}

#[async_trait]
impl SegmentSource for RangeSource {
    fn descriptor(&self) -> &Arc<StreamDescriptor> {
        &self.descriptor
    }

    async fn init(&mut self, window_end: Option<u64>) -> Result<Bytes, SourceError> {
        let end = window_end.unwrap_or(self.init_end);

        if let Some(chunk) = &self.init_chunk {
            if chunk.len() as u64 == end {
                return Ok(chunk.clone());
            }
        }

        let fetched = self.fetcher.fetch_range(&self.descriptor.url, 0..end).await?;
        self.total_size = fetched.total_size;
        tracing::debug!(url = %self.descriptor.url, len = fetched.data.len(), "Fetched init chunk");

        if window_end.is_none() {
            self.init_chunk = Some(fetched.data.clone());
        }
        Ok(fetched.data)
    }

    async fn pull(&mut self) -> Result<Bytes, SourceError> {
        if self.is_exhausted() {
            return Err(SourceError::Exhausted {
                url: self.descriptor.url.clone(),
                offset: self.cursor,
            });
        }

        let end = self.next_chunk_end();
        let fetched = self
            .fetcher
            .fetch_range(&self.descriptor.url, self.cursor..end)
            .await?;
        self.total_size = fetched.total_size;

        if fetched.data.is_empty() {
            return Err(SourceError::Exhausted {
                url: self.descriptor.url.clone(),
                offset: self.cursor,
            });
        }

        tracing::trace!(
            url = %self.descriptor.url,
            offset = self.cursor,
            len = fetched.data.len(),
            "Pulled media chunk"
        );
        self.cursor += fetched.data.len() as u64;
        Ok(fetched.data)
    }

    async fn seek(
        &mut self,
        time: f64,
        buffer: Option<&dyn SourceBuffer>,
    ) -> Result<(), SourceError> {
        if let Some(buffer) = buffer {
            clear_buffer(buffer).await?;
        }

        self.cursor = self.descriptor.offset_for_time(time).max(self.init_end);
        tracing::debug!(url = %self.descriptor.url, time, offset = self.cursor, "Seeked source");
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.total_size
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

/// Aborts any in-flight operation on `buffer` and removes everything buffered.
async fn clear_buffer(buffer: &dyn SourceBuffer) -> Result<(), SourceError> {
    buffer.abort()?;

    if buffer.buffered().is_empty() {
        return Ok(());
    }

    let mut events = buffer.subscribe();
    buffer.remove(0.0, f64::INFINITY)?;

    match wait_update_end(&mut events).await {
        Some(UpdateCompletion::Completed) => Ok(()),
        Some(UpdateCompletion::Failed { reason }) => Err(SourceError::BufferCleanup { reason }),
        Some(UpdateCompletion::Aborted) => Err(SourceError::BufferCleanup {
            reason: "removal aborted".to_string(),
        }),
        None => Err(SourceError::BufferCleanup {
            reason: "buffer event channel closed".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamDescriptor;
    use crate::test_support::{MemoryFetcher, synthetic_stream};

    fn source_over(descriptor: StreamDescriptor, data: Bytes, pull_size: u64) -> RangeSource {
        let fetcher = MemoryFetcher::new().with_resource(&descriptor.url, data);
        RangeSource::new(Arc::new(descriptor), Arc::new(fetcher), pull_size)
    }

    #[tokio::test]
    async fn test_init_returns_init_range() {
        let (descriptor, data) = synthetic_stream("mem://video", 32, 4, 100);
        let mut source = source_over(descriptor, data.clone(), 64);

        let init = source.init(None).await.unwrap();
        assert_eq!(init, data.slice(0..32));
        assert_eq!(source.position(), 32);

        let window = source.init(Some(48)).await.unwrap();
        assert_eq!(window.len(), 48);
    }

    #[tokio::test]
    async fn test_pull_follows_segment_table() {
        let (descriptor, data) = synthetic_stream("mem://video", 32, 3, 100);
        let mut source = source_over(descriptor, data.clone(), 7);

        source.init(None).await.unwrap();
        for i in 0..3 {
            let chunk = source.pull().await.unwrap();
            let start = 32 + i * 100;
            assert_eq!(chunk, data.slice(start..start + 100));
        }
        assert!(source.is_exhausted());
    }

    #[tokio::test]
    async fn test_pull_without_segment_table_uses_pull_size() {
        let (mut descriptor, data) = synthetic_stream("mem://audio", 10, 2, 50);
        descriptor.segments.clear();
        let mut source = source_over(descriptor, data, 30);

        let sizes = [
            source.pull().await.unwrap().len(),
            source.pull().await.unwrap().len(),
            source.pull().await.unwrap().len(),
            source.pull().await.unwrap().len(),
        ];
        assert_eq!(sizes, [30, 30, 30, 10]);
    }

    #[tokio::test]
    async fn test_pull_after_end_is_exhausted() {
        let (descriptor, data) = synthetic_stream("mem://video", 8, 1, 16);
        let mut source = source_over(descriptor, data, 64);

        source.pull().await.unwrap();
        let err = source.pull().await.unwrap_err();
        assert!(err.is_exhausted());
        assert!(matches!(err, SourceError::Exhausted { offset: 24, .. }));
    }

    #[tokio::test]
    async fn test_seek_positions_at_segment_start() {
        let (descriptor, data) = synthetic_stream("mem://video", 32, 5, 100);
        let mut source = source_over(descriptor, data.clone(), 64);

        source.seek(2.5, None).await.unwrap();
        assert_eq!(source.position(), 232);
        assert_eq!(source.pull().await.unwrap(), data.slice(232..332));

        source.seek(0.0, None).await.unwrap();
        assert_eq!(source.position(), 32);
    }

    #[tokio::test]
    async fn test_missing_resource_surfaces_fetch_error() {
        let (descriptor, _) = synthetic_stream("mem://video", 8, 1, 16);
        let fetcher = MemoryFetcher::new();
        let mut source = RangeSource::new(Arc::new(descriptor), Arc::new(fetcher), 64);

        let err = source.init(None).await.unwrap_err();
        assert!(matches!(err, SourceError::Fetch(_)));
    }
}
