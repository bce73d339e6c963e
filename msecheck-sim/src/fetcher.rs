//! In-memory range fetcher for offline runs.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use msecheck_core::fetch::{FetchError, FetchedRange, Fetcher};
use parking_lot::RwLock;

/// Serves registered resources from memory with configurable failure modes.
///
/// Clones share resources, counters and failure switches, so a test can keep
/// a handle while the host owns another.
#[derive(Clone, Default)]
pub struct InMemoryFetcher {
    resources: Arc<RwLock<HashMap<String, Bytes>>>,
    fail_on_fetch: Arc<AtomicBool>,
    fetch_delay: Duration,
    fetch_count: Arc<AtomicU64>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `data` under `url`, replacing any previous resource.
    pub fn insert(&self, url: &str, data: Bytes) {
        self.resources.write().insert(url.to_string(), data);
    }

    /// Sets a delay to simulate slow networks.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Makes the next fetch fail with a request error. Cleared after one attempt.
    pub fn fail_next_fetch(&self) {
        self.fail_on_fetch.store(true, Ordering::Release);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::Acquire)
    }

    /// Resets failure modes and counters.
    pub fn reset(&self) {
        self.fail_on_fetch.store(false, Ordering::Release);
        self.fetch_count.store(0, Ordering::Release);
    }
}

#[async_trait]
impl Fetcher for InMemoryFetcher {
    async fn fetch_range(&self, url: &str, range: Range<u64>) -> Result<FetchedRange, FetchError> {
        self.fetch_count.fetch_add(1, Ordering::AcqRel);

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        if self.fail_on_fetch.swap(false, Ordering::AcqRel) {
            return Err(FetchError::Request {
                url: url.to_string(),
                reason: "simulated network failure".to_string(),
            });
        }

        let data = self
            .resources
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
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
        tracing::trace!(url, start = range.start, end, "Serving in-memory range");
        Ok(FetchedRange {
            data: data.slice(range.start as usize..end as usize),
            total_size: size,
        })
    }
}
