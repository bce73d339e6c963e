//! Simulated media source owning the buffers of one playback context.

use std::sync::Arc;

use msecheck_core::host::{HostError, MediaEvent, MediaSource, SourceBuffer, SourceReadyState};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::buffer::SimSourceBuffer;
use crate::config::SimConfig;
use crate::rng::DeterministicRng;

/// Presentation-wide state shared between the media source and its buffers.
#[derive(Debug, Clone)]
pub(crate) struct Presentation {
    pub ready_state: SourceReadyState,
    pub duration: f64,
}

impl Presentation {
    pub fn open() -> Self {
        Self {
            ready_state: SourceReadyState::Open,
            duration: f64::NAN,
        }
    }
}

pub struct SimMediaSource {
    presentation: Arc<Mutex<Presentation>>,
    buffers: Mutex<Vec<SimSourceBuffer>>,
    media_events: broadcast::Sender<MediaEvent>,
    config: Arc<SimConfig>,
    rng: Arc<Mutex<DeterministicRng>>,
}

impl SimMediaSource {
    pub(crate) fn new(
        media_events: broadcast::Sender<MediaEvent>,
        config: Arc<SimConfig>,
        rng: Arc<Mutex<DeterministicRng>>,
    ) -> Self {
        Self {
            presentation: Arc::new(Mutex::new(Presentation::open())),
            buffers: Mutex::new(Vec::new()),
            media_events,
            config,
            rng,
        }
    }

    /// Buffers added so far, in creation order.
    pub fn sim_buffers(&self) -> Vec<SimSourceBuffer> {
        self.buffers.lock().clone()
    }

    /// Closes the source; later operations fail with `HostError::Closed`.
    pub fn close(&self) {
        self.presentation.lock().ready_state = SourceReadyState::Closed;
        let _ = self.media_events.send(MediaEvent::SourceClose);
    }

    fn check_idle(&self, operation: &str) -> Result<(), HostError> {
        if self.presentation.lock().ready_state != SourceReadyState::Open {
            return Err(HostError::InvalidState(format!(
                "{operation} requires an open media source"
            )));
        }
        if self.buffers.lock().iter().any(|b| b.updating()) {
            return Err(HostError::InvalidState(format!(
                "{operation} while a buffer is updating"
            )));
        }
        Ok(())
    }
}

impl MediaSource for SimMediaSource {
    fn ready_state(&self) -> SourceReadyState {
        self.presentation.lock().ready_state
    }

    fn duration(&self) -> f64 {
        self.presentation.lock().duration
    }

    fn set_duration(&self, duration: f64) -> Result<(), HostError> {
        if duration.is_nan() || duration < 0.0 {
            return Err(HostError::InvalidState(format!("invalid duration {duration}")));
        }
        self.check_idle("set duration")?;

        let previous = {
            let mut presentation = self.presentation.lock();
            std::mem::replace(&mut presentation.duration, duration)
        };

        for buffer in self.sim_buffers() {
            let end = buffer.buffered().last_end().unwrap_or(0.0);
            if end > duration {
                tracing::debug!(mime = buffer.mime_type(), end, duration, "Truncating buffer");
                buffer.truncate(duration)?;
            }
        }

        if previous.to_bits() != duration.to_bits() {
            let _ = self.media_events.send(MediaEvent::DurationChange { duration });
        }
        Ok(())
    }

    fn add_source_buffer(&self, type_string: &str) -> Result<Arc<dyn SourceBuffer>, HostError> {
        if self.presentation.lock().ready_state != SourceReadyState::Open {
            return Err(HostError::InvalidState(
                "add source buffer requires an open media source".to_string(),
            ));
        }
        if !self.config.supports_type(type_string) {
            return Err(HostError::NotSupported(type_string.to_string()));
        }

        let mut buffers = self.buffers.lock();
        if buffers.len() >= self.config.max_source_buffers {
            return Err(HostError::QuotaExceeded);
        }

        let buffer = SimSourceBuffer::new(
            type_string,
            Arc::clone(&self.presentation),
            self.media_events.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.rng),
        );
        buffers.push(buffer.clone());
        tracing::debug!(type_string, count = buffers.len(), "Added source buffer");
        Ok(Arc::new(buffer))
    }

    fn end_of_stream(&self) -> Result<(), HostError> {
        self.check_idle("end of stream")?;

        let buffered_end = self
            .sim_buffers()
            .iter()
            .filter_map(|b| b.buffered().last_end())
            .fold(0.0_f64, f64::max);

        let changed = {
            let mut presentation = self.presentation.lock();
            presentation.ready_state = SourceReadyState::Ended;
            let changed = presentation.duration.to_bits() != buffered_end.to_bits();
            presentation.duration = buffered_end;
            changed
        };

        if changed {
            let _ = self.media_events.send(MediaEvent::DurationChange {
                duration: buffered_end,
            });
        }
        let _ = self.media_events.send(MediaEvent::SourceEnded);
        tracing::debug!(duration = buffered_end, "End of stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use msecheck_core::MediaKind;
    use msecheck_core::host::wait_update_end;

    use super::*;
    use crate::container::{InitInfo, MediaSegmentInfo, encode_init, encode_media};

    const VIDEO: &str = "video/x-sim; codecs=\"simv.1\"";
    const AUDIO: &str = "audio/x-sim; codecs=\"sima.1\"";

    fn media_source() -> (SimMediaSource, broadcast::Receiver<MediaEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let source = SimMediaSource::new(
            tx,
            Arc::new(SimConfig::instant()),
            Arc::new(Mutex::new(DeterministicRng::from_seed(3))),
        );
        (source, rx)
    }

    async fn fill(buffer: &dyn SourceBuffer, kind: MediaKind, seconds: usize) {
        let init = encode_init(
            &InitInfo {
                kind,
                codec: "sim".to_string(),
                width: 0,
                height: 0,
                duration: 8.0,
            },
            0,
        );
        let mut chunks: Vec<Bytes> = vec![init];
        for i in 0..seconds {
            chunks.push(encode_media(
                MediaSegmentInfo {
                    start: i as f64,
                    duration: 1.0,
                },
                16,
            ));
        }
        for chunk in chunks {
            let mut events = buffer.subscribe();
            buffer.append_buffer(chunk).unwrap();
            wait_update_end(&mut events).await;
        }
    }

    #[tokio::test]
    async fn test_add_source_buffer_checks_type_and_quota() {
        let (source, _rx) = media_source();

        assert!(matches!(
            source.add_source_buffer("video/x-sim; codecs=\"nope\""),
            Err(HostError::NotSupported(_))
        ));
        source.add_source_buffer(VIDEO).unwrap();
        source.add_source_buffer(AUDIO).unwrap();
        assert_eq!(source.add_source_buffer(VIDEO).err(), Some(HostError::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_init_sets_duration_once() {
        let (source, mut rx) = media_source();
        let buffer = source.add_source_buffer(VIDEO).unwrap();

        assert!(source.duration().is_nan());
        fill(buffer.as_ref(), MediaKind::Video, 0).await;
        assert_eq!(source.duration(), 8.0);
        assert_eq!(rx.recv().await.unwrap(), MediaEvent::DurationChange { duration: 8.0 });
    }

    #[tokio::test]
    async fn test_set_duration_truncates_every_longer_buffer() {
        let (source, _rx) = media_source();
        let video = source.add_source_buffer(VIDEO).unwrap();
        let audio = source.add_source_buffer(AUDIO).unwrap();
        fill(video.as_ref(), MediaKind::Video, 4).await;
        fill(audio.as_ref(), MediaKind::Audio, 1).await;

        let mut video_events = video.subscribe();
        source.set_duration(2.0).unwrap();
        assert!(video.updating());
        assert!(!audio.updating());
        assert!(source.set_duration(3.0).is_err());

        wait_update_end(&mut video_events).await;
        assert_eq!(video.buffered().last_end(), Some(2.0));
        assert_eq!(audio.buffered().last_end(), Some(1.0));
    }

    #[tokio::test]
    async fn test_end_of_stream_uses_buffered_end() {
        let (source, mut rx) = media_source();
        let buffer = source.add_source_buffer(VIDEO).unwrap();
        fill(buffer.as_ref(), MediaKind::Video, 3).await;
        while !rx.is_empty() {
            let _ = rx.recv().await;
        }

        source.end_of_stream().unwrap();
        assert_eq!(source.ready_state(), SourceReadyState::Ended);
        assert_eq!(source.duration(), 3.0);
        assert_eq!(rx.recv().await.unwrap(), MediaEvent::DurationChange { duration: 3.0 });
        assert_eq!(rx.recv().await.unwrap(), MediaEvent::SourceEnded);

        fill(buffer.as_ref(), MediaKind::Video, 0).await;
        assert_eq!(source.ready_state(), SourceReadyState::Open);
    }

    #[tokio::test]
    async fn test_closed_source_rejects_appends() {
        let (source, _rx) = media_source();
        let buffer = source.add_source_buffer(VIDEO).unwrap();

        source.close();
        assert_eq!(buffer.append_buffer(Bytes::new()).err(), Some(HostError::Closed));
        assert!(source.add_source_buffer(AUDIO).is_err());
    }
}
