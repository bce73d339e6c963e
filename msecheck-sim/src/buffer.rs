//! Simulated source buffer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use msecheck_core::host::{BufferEvent, HostError, MediaEvent, SourceBuffer, SourceReadyState};
use msecheck_core::time_ranges::TimeRanges;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::SimConfig;
use crate::container::{Element, InitInfo, SegmentParser};
use crate::media_source::Presentation;
use crate::rng::DeterministicRng;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
struct BufferState {
    updating: bool,
    /// The in-flight operation is an append rather than a remove.
    appending: bool,
    /// Appends accepted while another append was in flight.
    queued: VecDeque<Bytes>,
    /// Bumped by every new operation and by abort; stale completions compare
    /// against it and drop themselves.
    generation: u64,
    ranges: TimeRanges,
    timestamp_offset: f64,
    parser: SegmentParser,
    init: Option<InitInfo>,
    appended_bytes: u64,
}

struct BufferCore {
    mime_type: String,
    state: Mutex<BufferState>,
    events: broadcast::Sender<BufferEvent>,
    presentation: Arc<Mutex<Presentation>>,
    media_events: broadcast::Sender<MediaEvent>,
    config: Arc<SimConfig>,
    rng: Arc<Mutex<DeterministicRng>>,
}

/// Buffer that parses the synthetic container and tracks buffered ranges.
///
/// Appends and removes complete on a spawned task after the configured
/// latency, firing `Update`/`Error` then `UpdateEnd`.
#[derive(Clone)]
pub struct SimSourceBuffer {
    core: Arc<BufferCore>,
}

impl SimSourceBuffer {
    pub(crate) fn new(
        mime_type: &str,
        presentation: Arc<Mutex<Presentation>>,
        media_events: broadcast::Sender<MediaEvent>,
        config: Arc<SimConfig>,
        rng: Arc<Mutex<DeterministicRng>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            core: Arc::new(BufferCore {
                mime_type: mime_type.to_string(),
                state: Mutex::new(BufferState {
                    updating: false,
                    appending: false,
                    queued: VecDeque::new(),
                    generation: 0,
                    ranges: TimeRanges::new(),
                    timestamp_offset: 0.0,
                    parser: SegmentParser::new(),
                    init: None,
                    appended_bytes: 0,
                }),
                events,
                presentation,
                media_events,
                config,
                rng,
            }),
        }
    }

    /// Init segment metadata, once one has been parsed.
    pub fn init_info(&self) -> Option<InitInfo> {
        self.core.state.lock().init.clone()
    }

    /// Total bytes whose append completed.
    pub fn appended_bytes(&self) -> u64 {
        self.core.state.lock().appended_bytes
    }

    /// Starts removing everything from `duration` on; used by duration changes.
    pub(crate) fn truncate(&self, duration: f64) -> Result<(), HostError> {
        self.remove(duration, f64::INFINITY)
    }

    /// Marks the buffer busy and returns the generation of the new operation.
    fn begin(&self, operation: &str, appending: bool) -> Result<u64, HostError> {
        let mut state = self.core.state.lock();
        if state.updating {
            return Err(HostError::Busy(format!(
                "{operation} while {} buffer is updating",
                self.core.mime_type
            )));
        }
        state.updating = true;
        state.appending = appending;
        state.generation += 1;
        Ok(state.generation)
    }

    fn check_open(&self) -> Result<(), HostError> {
        let mut presentation = self.core.presentation.lock();
        match presentation.ready_state {
            SourceReadyState::Closed => Err(HostError::Closed),
            SourceReadyState::Ended => {
                presentation.ready_state = SourceReadyState::Open;
                drop(presentation);
                let _ = self.core.media_events.send(MediaEvent::SourceOpen);
                Ok(())
            }
            SourceReadyState::Open => Ok(()),
        }
    }

    fn latency(&self, base: Duration) -> Duration {
        self.core.latency(base)
    }
}

impl BufferCore {
    fn latency(&self, base: Duration) -> Duration {
        self.rng.lock().jittered(base, self.config.latency_jitter)
    }

    fn spawn_append(self: &Arc<Self>, generation: u64, data: Bytes) {
        let delay = self.latency(self.config.append_latency);
        let core = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            core.finish_append(generation, data);
        });
    }

    fn finish_append(self: &Arc<Self>, generation: u64, data: Bytes) {
        let mut state = self.state.lock();
        if state.generation != generation || !state.updating {
            tracing::trace!(mime = %self.mime_type, "Dropping aborted append");
            return;
        }

        let parsed = state.parser.push(&data);
        let mut media_events = Vec::new();
        let outcome = match parsed {
            Ok(elements) => self.apply(&mut state, elements, &mut media_events),
            Err(e) => Err(e.to_string()),
        };

        state.updating = false;
        state.appending = false;
        if outcome.is_ok() {
            state.appended_bytes += data.len() as u64;
        } else {
            state.parser.reset();
            state.queued.clear();
        }
        let next = state.queued.pop_front().map(|queued| {
            state.updating = true;
            state.appending = true;
            state.generation += 1;
            (state.generation, queued)
        });
        let buffered = state.ranges.clone();
        drop(state);

        match outcome {
            Ok(()) => {
                tracing::trace!(mime = %self.mime_type, len = data.len(), buffered = %buffered, "Append completed");
                let _ = self.events.send(BufferEvent::Update);
            }
            Err(reason) => {
                tracing::debug!(mime = %self.mime_type, reason = %reason, "Append failed");
                let _ = self.events.send(BufferEvent::Error { reason });
            }
        }
        let _ = self.events.send(BufferEvent::UpdateEnd);
        for event in media_events {
            let _ = self.media_events.send(event);
        }

        if let Some((generation, queued)) = next {
            tracing::trace!(mime = %self.mime_type, len = queued.len(), "Starting queued append");
            self.spawn_append(generation, queued);
        }
    }

    fn apply(
        &self,
        state: &mut BufferState,
        elements: Vec<Element>,
        media_events: &mut Vec<MediaEvent>,
    ) -> Result<(), String> {
        for element in elements {
            match element {
                Element::Init(info) => {
                    let mut presentation = self.presentation.lock();
                    if presentation.duration.is_nan() && info.duration > 0.0 {
                        presentation.duration = info.duration;
                        media_events.push(MediaEvent::DurationChange {
                            duration: info.duration,
                        });
                    }
                    state.init = Some(info);
                }
                Element::Media(segment) => {
                    if state.init.is_none() {
                        return Err("media segment before init segment".to_string());
                    }
                    let start = segment.start + state.timestamp_offset;
                    let end = segment.end() + state.timestamp_offset;
                    state.ranges.add(start, end, self.config.merge_tolerance);
                }
            }
        }
        Ok(())
    }

    fn finish_remove(&self, generation: u64, start: f64, end: f64) {
        let mut state = self.state.lock();
        if state.generation != generation || !state.updating {
            return;
        }
        state.ranges.remove(start, end);
        state.updating = false;
        drop(state);

        tracing::trace!(mime = %self.mime_type, start, end, "Remove completed");
        let _ = self.events.send(BufferEvent::Update);
        let _ = self.events.send(BufferEvent::UpdateEnd);
    }
}

impl SourceBuffer for SimSourceBuffer {
    fn mime_type(&self) -> &str {
        &self.core.mime_type
    }

    fn append_buffer(&self, data: Bytes) -> Result<(), HostError> {
        self.check_open()?;
        if self.core.config.queue_concurrent_appends {
            let mut state = self.core.state.lock();
            if state.updating && state.appending {
                tracing::debug!(mime = %self.core.mime_type, "Queueing append behind in-flight append");
                state.queued.push_back(data);
                return Ok(());
            }
        }
        let generation = self.begin("append", true)?;
        self.core.spawn_append(generation, data);
        Ok(())
    }

    fn abort(&self) -> Result<(), HostError> {
        if self.core.presentation.lock().ready_state != SourceReadyState::Open {
            return Err(HostError::InvalidState(
                "abort requires an open media source".to_string(),
            ));
        }

        let mut state = self.core.state.lock();
        let was_updating = state.updating;
        state.updating = false;
        state.appending = false;
        state.queued.clear();
        state.generation += 1;
        state.parser.reset();
        drop(state);

        if was_updating {
            tracing::debug!(mime = %self.core.mime_type, "Aborted in-flight operation");
            let _ = self.core.events.send(BufferEvent::Abort);
            let _ = self.core.events.send(BufferEvent::UpdateEnd);
        }
        Ok(())
    }

    fn remove(&self, start: f64, end: f64) -> Result<(), HostError> {
        if start.is_nan() || start < 0.0 || !(end > start) {
            return Err(HostError::InvalidState(format!(
                "invalid remove range [{start}, {end})"
            )));
        }
        self.check_open()?;
        let generation = self.begin("remove", false)?;
        let delay = self.latency(self.core.config.remove_latency);

        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            core.finish_remove(generation, start, end);
        });
        Ok(())
    }

    fn buffered(&self) -> TimeRanges {
        self.core.state.lock().ranges.clone()
    }

    fn timestamp_offset(&self) -> f64 {
        self.core.state.lock().timestamp_offset
    }

    fn set_timestamp_offset(&self, offset: f64) -> Result<(), HostError> {
        let mut state = self.core.state.lock();
        if state.updating {
            return Err(HostError::InvalidState(
                "timestampOffset set while updating".to_string(),
            ));
        }
        state.timestamp_offset = offset;
        Ok(())
    }

    fn updating(&self) -> bool {
        self.core.state.lock().updating
    }

    fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.core.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use msecheck_core::MediaKind;
    use msecheck_core::host::{UpdateCompletion, wait_update_end};

    use super::*;
    use crate::container::{MediaSegmentInfo, encode_init, encode_media};

    fn buffer() -> SimSourceBuffer {
        buffer_with(SimConfig::instant())
    }

    fn buffer_with(config: SimConfig) -> SimSourceBuffer {
        let presentation = Arc::new(Mutex::new(Presentation::open()));
        let (media_events, _) = broadcast::channel(16);
        SimSourceBuffer::new(
            "video/x-sim; codecs=\"simv.1\"",
            presentation,
            media_events,
            Arc::new(config),
            Arc::new(Mutex::new(DeterministicRng::from_seed(1))),
        )
    }

    fn init() -> Bytes {
        encode_init(
            &InitInfo {
                kind: MediaKind::Video,
                codec: "simv.1".to_string(),
                width: 320,
                height: 240,
                duration: 4.0,
            },
            8,
        )
    }

    fn segment(start: f64) -> Bytes {
        encode_media(
            MediaSegmentInfo {
                start,
                duration: 1.0,
            },
            64,
        )
    }

    async fn append(buffer: &SimSourceBuffer, data: Bytes) -> Option<UpdateCompletion> {
        let mut events = buffer.subscribe();
        buffer.append_buffer(data).unwrap();
        wait_update_end(&mut events).await
    }

    #[tokio::test]
    async fn test_append_tracks_ranges() {
        let buffer = buffer();

        assert_eq!(append(&buffer, init()).await, Some(UpdateCompletion::Completed));
        assert_eq!(buffer.init_info().unwrap().width, 320);

        append(&buffer, segment(0.0)).await;
        append(&buffer, segment(1.0)).await;
        append(&buffer, segment(3.0)).await;

        let buffered = buffer.buffered();
        assert_eq!(buffered.len(), 2);
        assert_eq!(buffered.first_end(), Some(2.0));
        assert_eq!(buffered.last_end(), Some(4.0));
    }

    #[tokio::test]
    async fn test_second_append_while_updating_is_busy() {
        let buffer = buffer();
        append(&buffer, init()).await;

        buffer.append_buffer(segment(0.0)).unwrap();
        let err = buffer.append_buffer(segment(1.0)).unwrap_err();
        assert!(matches!(err, HostError::Busy(_)));
        assert!(err.is_busy());

        let err = buffer.remove(0.0, 1.0).unwrap_err();
        assert!(err.is_busy());
    }

    #[tokio::test]
    async fn test_invalid_remove_range_is_not_busy() {
        let buffer = buffer();

        let err = buffer.remove(2.0, 1.0).unwrap_err();
        assert!(matches!(err, HostError::InvalidState(_)));
        assert!(!err.is_busy());
    }

    #[tokio::test]
    async fn test_queued_append_runs_after_in_flight_one() {
        let buffer = buffer_with(SimConfig {
            queue_concurrent_appends: true,
            ..SimConfig::instant()
        });
        append(&buffer, init()).await;

        let mut events = buffer.subscribe();
        buffer.append_buffer(segment(0.0)).unwrap();
        buffer.append_buffer(segment(0.0)).unwrap();

        assert_eq!(wait_update_end(&mut events).await, Some(UpdateCompletion::Completed));
        assert!(buffer.updating());
        assert_eq!(wait_update_end(&mut events).await, Some(UpdateCompletion::Completed));
        assert!(!buffer.updating());

        let buffered = buffer.buffered();
        assert_eq!(buffered.len(), 1);
        assert_eq!(buffered.first_end(), Some(1.0));
    }

    #[tokio::test]
    async fn test_abort_drops_queued_appends() {
        let buffer = buffer_with(SimConfig {
            queue_concurrent_appends: true,
            ..SimConfig::instant()
        });
        append(&buffer, init()).await;

        buffer.append_buffer(segment(0.0)).unwrap();
        buffer.append_buffer(segment(1.0)).unwrap();
        buffer.abort().unwrap();
        assert!(!buffer.updating());

        append(&buffer, segment(3.0)).await;
        let buffered = buffer.buffered();
        assert_eq!(buffered.len(), 1);
        assert_eq!(buffered.get(0).map(|r| r.start), Some(3.0));
    }

    #[tokio::test]
    async fn test_media_before_init_fails() {
        let buffer = buffer();

        let completion = append(&buffer, segment(0.0)).await;
        assert!(matches!(completion, Some(UpdateCompletion::Failed { .. })));
        assert!(!buffer.updating());
        assert!(buffer.buffered().is_empty());
    }

    #[tokio::test]
    async fn test_abort_drops_in_flight_append() {
        let buffer = buffer();
        append(&buffer, init()).await;

        let mut events = buffer.subscribe();
        buffer.append_buffer(segment(0.0)).unwrap();
        buffer.abort().unwrap();
        assert!(!buffer.updating());
        assert_eq!(wait_update_end(&mut events).await, Some(UpdateCompletion::Aborted));

        tokio::task::yield_now().await;
        assert!(buffer.buffered().is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_offset_shifts_segments() {
        let buffer = buffer();
        append(&buffer, init()).await;

        buffer.set_timestamp_offset(10.0).unwrap();
        append(&buffer, segment(0.0)).await;

        assert_eq!(buffer.buffered().get(0).map(|r| r.start), Some(10.0));
    }

    #[tokio::test]
    async fn test_remove_splits_range() {
        let buffer = buffer();
        append(&buffer, init()).await;
        for start in [0.0, 1.0, 2.0] {
            append(&buffer, segment(start)).await;
        }

        let mut events = buffer.subscribe();
        buffer.remove(1.0, 2.0).unwrap();
        assert_eq!(wait_update_end(&mut events).await, Some(UpdateCompletion::Completed));
        assert_eq!(buffer.buffered().len(), 2);

        assert!(buffer.remove(2.0, 1.0).is_err());
    }
}
