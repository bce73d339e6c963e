//! Playback drivers against the clocked simulated element.

use std::time::Duration;

use msecheck_core::drivers::{
    Feed, append_init, append_until, play_through, wait_media_event, wait_until,
};
use msecheck_core::host::MediaEvent;
use msecheck_core::{MsecheckConfig, SegmentSource, SourceExt};

use crate::common::{harness, harness_with, jittery_sim};

#[tokio::test(start_paused = true)]
async fn test_play_through_feeds_both_buffers() {
    let h = harness_with("play_through_av", MsecheckConfig::for_testing(), jittery_sim()).await;
    let video = h.add_buffer("video");
    let audio = h.add_buffer("audio");
    let mut video_source = h.source("video");
    let mut audio_source = h.source("audio");

    append_init(&h.ctx, video.as_ref(), &mut video_source, 0.0).await.unwrap();
    append_init(&h.ctx, audio.as_ref(), &mut audio_source, 0.0).await.unwrap();

    let element = h.playback.element.as_ref();
    play_through(
        &h.ctx,
        element,
        0.0,
        4.0,
        Feed::new(video.as_ref(), &mut video_source),
        Some(Feed::new(audio.as_ref(), &mut audio_source)),
    )
    .await
    .unwrap();

    assert!(element.current_time() >= 4.0);
    assert!(element.paused());
    assert!(video.buffered().first_end().unwrap() >= 4.0);
    assert!(audio.buffered().first_end().unwrap() >= 4.0);
}

#[tokio::test(start_paused = true)]
async fn test_play_through_seeks_when_starting_elsewhere() {
    let h = harness("play_through_seek").await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    source.seek(5.0, Some(buffer.as_ref())).await.unwrap();

    let element = h.playback.element.as_ref();
    play_through(&h.ctx, element, 5.0, 7.0, Feed::new(buffer.as_ref(), &mut source), None)
        .await
        .unwrap();

    assert!(element.current_time() >= 7.0);
    assert_eq!(buffer.buffered().get(0).map(|r| r.start), Some(5.0));
}

#[tokio::test(start_paused = true)]
async fn test_play_through_times_out_when_source_runs_dry() {
    let mut config = MsecheckConfig::for_testing();
    config.playback.playback_ceiling = Duration::from_secs(3);
    let h = harness_with("play_through_dry", config, msecheck_sim::SimConfig::instant()).await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video").segment_limit(2);

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    let element = h.playback.element.as_ref();
    let err = play_through(&h.ctx, element, 0.0, 5.0, Feed::new(buffer.as_ref(), &mut source), None)
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(element.current_time(), 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_underflow_stalls_then_recovers() {
    let h = harness("underflow").await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");
    let element = h.playback.element.as_ref();
    let mut events = element.subscribe();

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    append_until(&h.ctx, buffer.as_ref(), &mut source, 1.0).await.unwrap();
    element.play();

    let stalled = wait_media_event(&h.ctx, &mut events, "waiting", |e| {
        matches!(e, MediaEvent::Waiting { .. })
    })
    .await
    .unwrap();
    assert_eq!(stalled, MediaEvent::Waiting { current_time: 1.0 });
    assert!(!element.paused());

    play_through(&h.ctx, element, 1.0, 3.0, Feed::new(buffer.as_ref(), &mut source), None)
        .await
        .unwrap();
    assert!(element.current_time() >= 3.0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_resolves_during_playback() {
    let h = harness("wait_until").await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    append_until(&h.ctx, buffer.as_ref(), &mut source, 3.0).await.unwrap();

    let element = h.playback.element.as_ref();
    element.play();
    wait_until(&h.ctx, element, 2.0).await.unwrap();
    assert!(element.current_time() >= 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_never_resolves_while_paused() {
    let h = harness("wait_until_paused").await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    append_until(&h.ctx, buffer.as_ref(), &mut source, 3.0).await.unwrap();

    let element = h.playback.element.as_ref();
    let waited =
        tokio::time::timeout(Duration::from_secs(5), wait_until(&h.ctx, element, 2.0)).await;
    assert!(waited.is_err());
    assert_eq!(element.current_time(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_seek_with_buffer_clears_in_flight_state() {
    let h = harness_with("seek_clear", MsecheckConfig::for_testing(), jittery_sim()).await;
    let buffer = h.add_buffer("video");
    let mut source = h.source("video");

    append_init(&h.ctx, buffer.as_ref(), &mut source, 0.0).await.unwrap();
    append_until(&h.ctx, buffer.as_ref(), &mut source, 3.0).await.unwrap();
    let chunk = source.pull().await.unwrap();
    buffer.append_buffer(chunk).unwrap();
    assert!(buffer.updating());

    source.seek(6.0, Some(buffer.as_ref())).await.unwrap();
    assert!(!buffer.updating());
    assert!(buffer.buffered().is_empty());

    append_until(&h.ctx, buffer.as_ref(), &mut source, 8.0).await.unwrap();
    let first = buffer.buffered().get(0).unwrap();
    assert_eq!(first.start, 6.0);
    assert_eq!(first.end, 8.0);
}
