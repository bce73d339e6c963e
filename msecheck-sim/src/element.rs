//! Simulated media element driven by a periodic clock.

use std::sync::{Arc, Weak};
use std::time::Duration;

use msecheck_core::MediaKind;
use msecheck_core::host::{
    ElementReadyState, MediaElement, MediaEvent, MediaSource, SourceBuffer, SourceReadyState,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::buffer::SimSourceBuffer;
use crate::config::SimConfig;
use crate::media_source::SimMediaSource;

/// Slack when deciding the playhead sits at the presentation end.
const END_EPSILON: f64 = 1e-6;

#[derive(Debug)]
struct ElementState {
    current_time: f64,
    paused: bool,
    seeking: bool,
    stalled: bool,
    ended: bool,
    ready_state: ElementReadyState,
    width: u32,
    height: u32,
}

struct ElementCore {
    state: Mutex<ElementState>,
    events: broadcast::Sender<MediaEvent>,
    media_source: Arc<SimMediaSource>,
    tolerance: f64,
}

/// Element whose playhead advances on every clock tick while data is
/// buffered at the playhead in every buffer.
///
/// Running out of data stalls playback with a single `Waiting` event; it
/// resumes as soon as data arrives. Reaching the duration of an ended source
/// pauses and fires `Ended`.
pub struct SimMediaElement {
    core: Arc<ElementCore>,
    ticker: JoinHandle<()>,
}

impl SimMediaElement {
    /// Creates the element and starts its clock on the current runtime.
    pub(crate) fn new(
        media_source: Arc<SimMediaSource>,
        events: broadcast::Sender<MediaEvent>,
        config: &SimConfig,
    ) -> Self {
        let core = Arc::new(ElementCore {
            state: Mutex::new(ElementState {
                current_time: 0.0,
                paused: true,
                seeking: false,
                stalled: false,
                ended: false,
                ready_state: ElementReadyState::HaveNothing,
                width: 0,
                height: 0,
            }),
            events,
            media_source,
            tolerance: config.merge_tolerance,
        });

        let interval = config.tick_interval.max(Duration::from_millis(1));
        let step = interval.as_secs_f64() * config.playback_rate;
        let ticker = spawn_ticker(Arc::downgrade(&core), interval, step);

        Self { core, ticker }
    }

    /// Advances the clock by `step` media seconds.
    pub fn tick(&self, step: f64) {
        self.core.tick(step);
    }

    pub fn is_ended(&self) -> bool {
        self.core.state.lock().ended
    }
}

impl Drop for SimMediaElement {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

fn spawn_ticker(core: Weak<ElementCore>, interval: Duration, step: f64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(core) = core.upgrade() else {
                break;
            };
            core.tick(step);
        }
    })
}

/// End of the data playable from `time`: the smallest end, across buffers, of
/// the range holding `time`. `None` if any buffer has nothing there.
fn playable_end(buffers: &[SimSourceBuffer], time: f64, tolerance: f64) -> Option<f64> {
    if buffers.is_empty() {
        return None;
    }
    buffers
        .iter()
        .map(|b| {
            b.buffered()
                .iter()
                .find(|r| r.start <= time + tolerance && r.end > time)
                .map(|r| r.end)
        })
        .try_fold(f64::INFINITY, |acc, end| end.map(|e| acc.min(e)))
}

impl ElementCore {
    fn tick(&self, step: f64) {
        let buffers = self.media_source.sim_buffers();
        let source_state = self.media_source.ready_state();
        let duration = self.media_source.duration();
        let mut events = Vec::new();
        let mut state = self.state.lock();

        if state.ready_state == ElementReadyState::HaveNothing {
            let inits: Vec<_> = buffers.iter().filter_map(|b| b.init_info()).collect();
            if buffers.is_empty() || inits.len() < buffers.len() {
                return;
            }
            if let Some(video) = inits.iter().find(|i| i.kind == MediaKind::Video) {
                state.width = video.width;
                state.height = video.height;
            }
            state.ready_state = ElementReadyState::HaveMetadata;
            events.push(MediaEvent::LoadedMetadata);
        }

        let mut end = playable_end(&buffers, state.current_time, self.tolerance);

        if state.seeking && end.is_some() {
            state.seeking = false;
            events.push(MediaEvent::Seeked {
                current_time: state.current_time,
            });
        }

        if !state.paused && !state.seeking && !state.ended {
            let limit = end.map(|e| if duration.is_nan() { e } else { e.min(duration) });
            let next = limit.map(|l| (state.current_time + step).min(l));

            match next {
                Some(next) if next > state.current_time => {
                    state.current_time = next;
                    state.stalled = false;
                    events.push(MediaEvent::TimeUpdate { current_time: next });
                }
                _ => {
                    let at_end = source_state == SourceReadyState::Ended
                        && state.current_time >= duration - END_EPSILON;
                    if at_end {
                        state.ended = true;
                        state.paused = true;
                        events.push(MediaEvent::Pause);
                        events.push(MediaEvent::Ended);
                    } else if !state.stalled {
                        state.stalled = true;
                        events.push(MediaEvent::Waiting {
                            current_time: state.current_time,
                        });
                    }
                }
            }
            end = playable_end(&buffers, state.current_time, self.tolerance);
        }

        state.ready_state = match end {
            Some(e) if e - state.current_time > step => ElementReadyState::HaveEnoughData,
            Some(_) => ElementReadyState::HaveCurrentData,
            None => ElementReadyState::HaveMetadata,
        };
        drop(state);

        for event in events {
            let _ = self.events.send(event);
        }
    }
}

impl MediaElement for SimMediaElement {
    fn current_time(&self) -> f64 {
        self.core.state.lock().current_time
    }

    fn set_current_time(&self, time: f64) {
        let target = time.max(0.0);
        {
            let mut state = self.core.state.lock();
            state.current_time = target;
            state.seeking = true;
            state.stalled = false;
            state.ended = false;
        }
        tracing::trace!(target, "Element seeking");
        let _ = self.core.events.send(MediaEvent::Seeking { target });
    }

    fn duration(&self) -> f64 {
        self.core.media_source.duration()
    }

    fn paused(&self) -> bool {
        self.core.state.lock().paused
    }

    fn play(&self) {
        let started = {
            let mut state = self.core.state.lock();
            if state.ended {
                state.ended = false;
                state.current_time = 0.0;
            }
            std::mem::replace(&mut state.paused, false)
        };
        if started {
            let _ = self.core.events.send(MediaEvent::Play);
        }
    }

    fn pause(&self) {
        let was_playing = {
            let mut state = self.core.state.lock();
            !std::mem::replace(&mut state.paused, true)
        };
        if was_playing {
            let _ = self.core.events.send(MediaEvent::Pause);
        }
    }

    fn video_width(&self) -> u32 {
        self.core.state.lock().width
    }

    fn video_height(&self) -> u32 {
        self.core.state.lock().height
    }

    fn ready_state(&self) -> ElementReadyState {
        self.core.state.lock().ready_state
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.core.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use msecheck_core::host::wait_update_end;

    use super::*;
    use crate::container::{InitInfo, MediaSegmentInfo, encode_init, encode_media};
    use crate::rng::DeterministicRng;

    const VIDEO: &str = "video/x-sim; codecs=\"simv.1\"";

    /// Element with a clock slow enough that tests drive it by hand.
    fn setup() -> (SimMediaElement, Arc<SimMediaSource>, Arc<dyn SourceBuffer>) {
        let config = SimConfig {
            tick_interval: Duration::from_secs(3600),
            ..SimConfig::instant()
        };
        let (events, _) = broadcast::channel(256);
        let source = Arc::new(SimMediaSource::new(
            events.clone(),
            Arc::new(config.clone()),
            Arc::new(Mutex::new(DeterministicRng::from_seed(5))),
        ));
        let buffer = source.add_source_buffer(VIDEO).unwrap();
        let element = SimMediaElement::new(Arc::clone(&source), events, &config);
        (element, source, buffer)
    }

    async fn append(buffer: &dyn SourceBuffer, data: Bytes) {
        let mut events = buffer.subscribe();
        buffer.append_buffer(data).unwrap();
        wait_update_end(&mut events).await;
    }

    async fn append_seconds(buffer: &dyn SourceBuffer, range: std::ops::Range<usize>) {
        for i in range {
            let segment = MediaSegmentInfo {
                start: i as f64,
                duration: 1.0,
            };
            append(buffer, encode_media(segment, 8)).await;
        }
    }

    async fn init(buffer: &dyn SourceBuffer) {
        let info = InitInfo {
            kind: MediaKind::Video,
            codec: "simv.1".to_string(),
            width: 640,
            height: 360,
            duration: 4.0,
        };
        append(buffer, encode_init(&info, 0)).await;
    }

    #[tokio::test]
    async fn test_metadata_after_init() {
        let (element, _source, buffer) = setup();
        let mut events = element.subscribe();

        element.tick(0.1);
        assert_eq!(element.ready_state(), ElementReadyState::HaveNothing);

        init(buffer.as_ref()).await;
        element.tick(0.1);
        assert_eq!(element.video_width(), 640);
        assert_eq!(element.video_height(), 360);

        // The init append announces the duration before the tick reports metadata.
        assert_eq!(
            events.recv().await.unwrap(),
            MediaEvent::DurationChange { duration: 4.0 }
        );
        assert_eq!(events.recv().await.unwrap(), MediaEvent::LoadedMetadata);
    }

    #[tokio::test]
    async fn test_playback_stalls_and_recovers() {
        let (element, _source, buffer) = setup();
        init(buffer.as_ref()).await;
        append_seconds(buffer.as_ref(), 0..1).await;
        let mut events = element.subscribe();

        element.play();
        for _ in 0..4 {
            element.tick(0.4);
        }
        assert_eq!(element.current_time(), 1.0);
        assert!(!element.paused());

        let seen: Vec<MediaEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        let waiting = seen
            .iter()
            .filter(|e| matches!(e, MediaEvent::Waiting { .. }))
            .count();
        assert_eq!(waiting, 1);

        append_seconds(buffer.as_ref(), 1..2).await;
        element.tick(0.4);
        assert!((element.current_time() - 1.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ended_after_end_of_stream() {
        let (element, source, buffer) = setup();
        init(buffer.as_ref()).await;
        append_seconds(buffer.as_ref(), 0..2).await;
        source.end_of_stream().unwrap();

        element.set_current_time(1.5);
        element.play();
        for _ in 0..5 {
            element.tick(0.5);
        }

        assert!(element.is_ended());
        assert!(element.paused());
        assert_eq!(element.current_time(), 2.0);
    }

    #[tokio::test]
    async fn test_seek_completes_once_data_is_buffered() {
        let (element, _source, buffer) = setup();
        init(buffer.as_ref()).await;
        element.tick(0.1);
        let mut events = element.subscribe();

        element.set_current_time(3.0);
        element.tick(0.1);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Seeking { target: 3.0 });
        assert!(events.try_recv().is_err());

        append_seconds(buffer.as_ref(), 3..4).await;
        element.tick(0.1);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Seeked { current_time: 3.0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_playback() {
        let config = SimConfig::instant();
        let (events, _) = broadcast::channel(256);
        let source = Arc::new(SimMediaSource::new(
            events.clone(),
            Arc::new(config.clone()),
            Arc::new(Mutex::new(DeterministicRng::from_seed(5))),
        ));
        let buffer = source.add_source_buffer(VIDEO).unwrap();
        let element = SimMediaElement::new(Arc::clone(&source), events, &config);

        init(buffer.as_ref()).await;
        append_seconds(buffer.as_ref(), 0..3).await;
        element.play();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(element.current_time() >= 1.5);
    }
}
