//! Host implementation wiring simulated element, media source and fetcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use msecheck_core::fetch::Fetcher;
use msecheck_core::host::{Host, HostError, MediaEvent, PlaybackContext};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::SimConfig;
use crate::element::SimMediaElement;
use crate::fetcher::InMemoryFetcher;
use crate::media_source::SimMediaSource;
use crate::rng::DeterministicRng;

const MEDIA_EVENT_CAPACITY: usize = 256;

/// Deterministic in-process host.
///
/// Every context opened from one host shares a single seeded generator, so
/// the sequence of operation latencies is fixed for a given seed and test
/// order.
pub struct SimHost {
    config: Arc<SimConfig>,
    fetcher: Arc<dyn Fetcher>,
    rng: Arc<Mutex<DeterministicRng>>,
    opened: AtomicUsize,
}

impl SimHost {
    pub fn new(config: SimConfig, fetcher: InMemoryFetcher) -> Self {
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Simulated playback fed by any fetcher, such as an HTTP one serving
    /// exported fixtures.
    pub fn with_fetcher(config: SimConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let rng = DeterministicRng::from_seed(config.seed);
        Self {
            config: Arc::new(config),
            fetcher,
            rng: Arc::new(Mutex::new(rng)),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Number of playback contexts opened so far.
    pub fn contexts_opened(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Host for SimHost {
    fn name(&self) -> &str {
        "msecheck-sim"
    }

    fn supports_media_source(&self) -> bool {
        self.config.media_source_supported
    }

    fn is_type_supported(&self, type_string: &str) -> bool {
        self.config.media_source_supported && self.config.supports_type(type_string)
    }

    async fn open(&self) -> Result<PlaybackContext, HostError> {
        if !self.config.media_source_supported {
            return Err(HostError::NotSupported(
                "segmented append is disabled".to_string(),
            ));
        }

        let (events, _) = broadcast::channel(MEDIA_EVENT_CAPACITY);
        let media_source = Arc::new(SimMediaSource::new(
            events.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.rng),
        ));
        let element = SimMediaElement::new(Arc::clone(&media_source), events.clone(), &self.config);
        let _ = events.send(MediaEvent::SourceOpen);

        let count = self.opened.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(count, "Opened simulated playback context");

        Ok(PlaybackContext {
            element: Arc::new(element),
            media_source,
        })
    }

    fn fetcher(&self) -> Arc<dyn Fetcher> {
        Arc::clone(&self.fetcher)
    }
}

#[cfg(test)]
mod tests {
    use msecheck_core::host::{MediaElement, MediaSource, SourceReadyState};

    use super::*;

    #[tokio::test]
    async fn test_open_yields_fresh_open_context() {
        let host = SimHost::new(SimConfig::instant(), InMemoryFetcher::new());

        let first = host.open().await.unwrap();
        let second = host.open().await.unwrap();
        assert_eq!(first.media_source.ready_state(), SourceReadyState::Open);
        assert!(first.media_source.duration().is_nan());
        assert!(first.element.paused());
        assert_eq!(host.contexts_opened(), 2);

        first
            .media_source
            .add_source_buffer("video/x-sim; codecs=\"simv.1\"")
            .unwrap();
        second
            .media_source
            .add_source_buffer("video/x-sim; codecs=\"simv.1\"")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_media_source() {
        let config = SimConfig {
            media_source_supported: false,
            ..SimConfig::instant()
        };
        let host = SimHost::new(config, InMemoryFetcher::new());

        assert!(!host.supports_media_source());
        assert!(!host.is_type_supported("video/x-sim; codecs=\"simv.1\""));
        assert!(matches!(host.open().await, Err(HostError::NotSupported(_))));
    }

    #[test]
    fn test_type_support_follows_codecs() {
        let host = SimHost::new(SimConfig::instant(), InMemoryFetcher::new());

        assert!(host.is_type_supported("audio/x-sim; codecs=\"sima.1\""));
        assert!(!host.is_type_supported("video/x-sim; codecs=\"simv.hevc\""));
        assert!(!host.is_type_supported("video/mp4; codecs=\"avc1.4d401e\""));
    }

    #[tokio::test]
    async fn test_host_serves_through_given_fetcher() {
        let fetcher = InMemoryFetcher::new();
        fetcher.insert("http://media.local/video.simv", bytes::Bytes::from_static(b"SIMI"));
        let host = SimHost::with_fetcher(SimConfig::instant(), Arc::new(fetcher.clone()));

        let fetched = host
            .fetcher()
            .fetch_range("http://media.local/video.simv", 0..4)
            .await
            .unwrap();
        assert_eq!(&fetched.data[..], b"SIMI");
        assert_eq!(fetcher.fetch_count(), 1);
    }
}
