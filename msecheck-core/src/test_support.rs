//! Test fixtures shared by unit tests in this crate.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;

use crate::fetch::{FetchError, FetchedRange, Fetcher};
use crate::stream::{MediaKind, SegmentInfo, StreamDescriptor};

/// Serves resources from memory.
#[derive(Default)]
pub struct MemoryFetcher {
    resources: HashMap<String, Bytes>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, url: &str, data: Bytes) -> Self {
        self.resources.insert(url.to_string(), data);
        self
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch_range(&self, url: &str, range: Range<u64>) -> Result<FetchedRange, FetchError> {
        let data = self.resources.get(url).ok_or_else(|| FetchError::NotFound {
            url: url.to_string(),
        })?;
        let size = data.len() as u64;
        if range.start > range.end || range.start > size {
            return Err(FetchError::InvalidRange {
                url: url.to_string(),
                start: range.start,
                end: range.end,
                size,
            });
        }
        let end = range.end.min(size);
        Ok(FetchedRange {
            data: data.slice(range.start as usize..end as usize),
            total_size: size,
        })
    }
}

/// Builds a one-second-per-segment descriptor and matching patterned bytes.
pub fn synthetic_stream(
    url: &str,
    init_size: usize,
    segments: usize,
    segment_size: usize,
) -> (StreamDescriptor, Bytes) {
    let total = init_size + segments * segment_size;
    let data: Vec<u8> = (0..total).map(|i| ((i * 31) % 251) as u8).collect();

    let segment_table = (0..segments)
        .map(|i| SegmentInfo {
            offset: (init_size + i * segment_size) as u64,
            size: segment_size as u64,
            start: i as f64,
            duration: 1.0,
        })
        .collect();

    let descriptor = StreamDescriptor {
        codec: "test".to_string(),
        mime_type: "video/test".to_string(),
        kind: MediaKind::Video,
        url: url.to_string(),
        size: total as u64,
        duration: segments as f64,
        init_size: init_size as u64,
        segments: segment_table,
        expected: BTreeMap::new(),
    };

    (descriptor, Bytes::from(data))
}
