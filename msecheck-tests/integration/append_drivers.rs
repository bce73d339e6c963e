//! Append, merge and duration drivers against the simulated buffers.

use bytes::Bytes;
use msecheck_core::drivers::{append_and_wait, append_init, append_until, safe_append, set_duration};
use msecheck_core::host::BufferEvent;
use msecheck_core::{
    ConformError, HostError, MsecheckConfig, SegmentSource, SourceBuffer, SourceExt, TimeRanges,
};
use tokio::sync::broadcast;

use crate::common::{harness, harness_with, jittery_sim};

#[tokio::test(start_paused = true)]
async fn test_append_until_stops_at_first_range_reaching_target() {
    let h = harness("append_until").await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    append_until(&h.ctx, buffer.as_ref(), &mut source, 3.0).await.unwrap();

    let buffered = buffer.buffered();
    assert_eq!(buffered.len(), 1);
    assert_eq!(buffered.first_end(), Some(3.0));
    assert!(!source.is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn test_append_until_running_dry_is_a_failure() {
    let h = harness("append_until_dry").await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video").segment_limit(2);

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    let err = append_until(&h.ctx, buffer.as_ref(), &mut source, 5.0)
        .await
        .unwrap_err();

    assert!(matches!(err, ConformError::Check { .. }), "got {err:?}");
    assert!(!err.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_append_until_iteration_cap_is_a_timeout() {
    let mut config = MsecheckConfig::for_testing();
    config.append.max_append_iterations = 1;
    let h = harness_with("append_until_cap", config, msecheck_sim::SimConfig::instant()).await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    let err = append_until(&h.ctx, buffer.as_ref(), &mut source, 5.0)
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(buffer.buffered().first_end(), Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn test_append_init_positions_source_at_start_time() {
    let h = harness("append_init_start").await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");
    let descriptor = h.catalog.get("video").unwrap();

    append_init(&h.ctx, buffer.as_ref(), &mut source, 4.5).await.unwrap();
    assert_eq!(source.position(), descriptor.segments[4].offset);

    let chunk = source.pull().await.unwrap();
    append_and_wait(&h.ctx, buffer.as_ref(), chunk).await.unwrap();
    assert_eq!(buffer.buffered().get(0).map(|r| r.start), Some(4.0));
}

#[tokio::test(start_paused = true)]
async fn test_set_duration_joins_every_truncated_buffer() {
    let h = harness_with("set_duration_join", MsecheckConfig::for_testing(), jittery_sim()).await;
    let video = h.add_buffer("video");
    let audio = h.add_buffer("audio");
    let mut video_source = h.source("video");
    let mut audio_source = h.source("audio");

    append_init(&h.ctx, video.as_ref(), &mut video_source, 0.0).await.unwrap();
    append_init(&h.ctx, audio.as_ref(), &mut audio_source, 0.0).await.unwrap();
    append_until(&h.ctx, video.as_ref(), &mut video_source, 4.0).await.unwrap();
    append_until(&h.ctx, audio.as_ref(), &mut audio_source, 4.0).await.unwrap();

    let buffers = [video.clone(), audio.clone()];
    set_duration(&h.ctx, h.playback.media_source.as_ref(), &buffers, 2.0)
        .await
        .unwrap();

    assert!(!video.updating());
    assert!(!audio.updating());
    assert_eq!(h.playback.media_source.duration(), 2.0);
    assert_eq!(video.buffered().last_end(), Some(2.0));
    assert_eq!(audio.buffered().last_end(), Some(2.0));
}

#[tokio::test(start_paused = true)]
async fn test_set_duration_while_updating_is_rejected() {
    let h = harness_with("set_duration_busy", MsecheckConfig::for_testing(), jittery_sim()).await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");

    let init = source.init(None).await.unwrap();
    buffer.append_buffer(init).unwrap();

    let err = set_duration(&h.ctx, h.playback.media_source.as_ref(), &[buffer.clone()], 5.0)
        .await
        .unwrap_err();
    assert!(matches!(err, ConformError::Host(HostError::InvalidState(_))));
}

#[tokio::test(start_paused = true)]
async fn test_safe_append_reports_busy_as_false() {
    let h = harness_with("safe_append", MsecheckConfig::for_testing(), jittery_sim()).await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");
    let init = source.init(None).await.unwrap();

    assert!(safe_append(buffer.as_ref(), init.clone()).unwrap());
    assert!(!safe_append(buffer.as_ref(), init).unwrap());
    assert!(buffer.updating());
}

/// Idle buffer whose every append fails with a fixed error.
struct RejectingBuffer {
    error: HostError,
    events: broadcast::Sender<BufferEvent>,
}

impl RejectingBuffer {
    fn new(error: HostError) -> Self {
        let (events, _) = broadcast::channel(4);
        Self { error, events }
    }
}

impl SourceBuffer for RejectingBuffer {
    fn mime_type(&self) -> &str {
        "video/x-sim"
    }

    fn append_buffer(&self, _data: Bytes) -> Result<(), HostError> {
        Err(self.error.clone())
    }

    fn abort(&self) -> Result<(), HostError> {
        Ok(())
    }

    fn remove(&self, _start: f64, _end: f64) -> Result<(), HostError> {
        Err(self.error.clone())
    }

    fn buffered(&self) -> TimeRanges {
        TimeRanges::new()
    }

    fn timestamp_offset(&self) -> f64 {
        0.0
    }

    fn set_timestamp_offset(&self, _offset: f64) -> Result<(), HostError> {
        Ok(())
    }

    fn updating(&self) -> bool {
        false
    }

    fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.events.subscribe()
    }
}

#[test]
fn test_safe_append_propagates_non_busy_rejection() {
    let removed = HostError::InvalidState("source buffer was removed".to_string());
    let buffer = RejectingBuffer::new(removed.clone());

    let err = safe_append(&buffer, Bytes::from_static(b"chunk")).unwrap_err();
    assert_eq!(err, removed);
    assert!(!err.is_busy());
}

#[test]
fn test_safe_append_swallows_only_busy() {
    let buffer = RejectingBuffer::new(HostError::Busy("append while updating".to_string()));
    assert!(!safe_append(&buffer, Bytes::from_static(b"chunk")).unwrap());

    let closed = RejectingBuffer::new(HostError::Closed);
    assert_eq!(
        safe_append(&closed, Bytes::from_static(b"chunk")).unwrap_err(),
        HostError::Closed
    );
}

/// Appends two segments, aborts, then re-appends them shifted by `duration + gap`.
async fn shifted_reappend(gap: f64) -> msecheck_core::TimeRanges {
    let h = harness("timestamp_offset").await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video").segment_limit(2);

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    for _ in 0..2 {
        let chunk = source.pull().await.unwrap();
        append_and_wait(&h.ctx, buffer.as_ref(), chunk).await.unwrap();
    }
    let duration = buffer.buffered().last_end().unwrap();

    buffer.abort().unwrap();
    assert!(!buffer.updating());
    buffer.set_timestamp_offset(duration + gap).unwrap();
    assert_eq!(buffer.timestamp_offset(), duration + gap);
    source.seek(0.0, None).await.unwrap();
    for _ in 0..2 {
        let chunk = source.pull().await.unwrap();
        append_and_wait(&h.ctx, buffer.as_ref(), chunk).await.unwrap();
    }
    buffer.buffered()
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_offset_merges_into_one_range() {
    let buffered = shifted_reappend(-0.1).await;
    assert_eq!(buffered.len(), 1);
    assert!((buffered.last_end().unwrap() - 3.9).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_small_gap_merges_into_one_range() {
    let buffered = shifted_reappend(0.01).await;
    assert_eq!(buffered.len(), 1);
    assert!((buffered.last_end().unwrap() - 4.01).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_large_gap_keeps_two_ranges() {
    let buffered = shifted_reappend(0.3).await;
    assert_eq!(buffered.len(), 2);
    assert!((buffered.last_end().unwrap() - 4.3).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_segments_fill_gaps() {
    let h = harness("out_of_order").await;
    let buffer = h.add_buffer("video");
    let descriptor = h.catalog.get("video").unwrap();
    let mut source = h.source("video");

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    let mut counts = vec![buffer.buffered().len()];
    for index in [0usize, 2, 1, 4, 3] {
        source.seek(descriptor.segments[index].start, None).await.unwrap();
        let chunk = source.pull().await.unwrap();
        append_and_wait(&h.ctx, buffer.as_ref(), chunk).await.unwrap();
        counts.push(buffer.buffered().len());
    }

    assert_eq!(counts, vec![0, 1, 2, 1, 2, 1]);
    assert_eq!(buffer.buffered().first_end(), Some(5.0));
}
