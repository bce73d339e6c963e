//! Playback cases: play-through, stalls, seeks and end of stream.

use std::time::Duration;

use super::PLAYBACK;
use crate::drivers::{
    Feed, append_and_wait, append_init, append_until, play_through, wait_media_event, wait_until,
};
use crate::error::Result;
use crate::host::{MediaEvent, SourceBuffer, SourceReadyState};
use crate::source::SegmentSource;
use crate::suite::{TestCase, TestEnv};

pub(super) fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("PlayThrough", PLAYBACK, play_through_av)
            .streams(&["video", "audio"])
            .title("Audio and video play through while being fed")
            .timeout(Duration::from_secs(45)),
        TestCase::new("WaitUntilPlaying", PLAYBACK, wait_until_playing)
            .streams(&["video"])
            .title("Current time advances over buffered media"),
        TestCase::new("PlaybackAfterSeek", PLAYBACK, playback_after_seek)
            .streams(&["video"])
            .title("Playback resumes from a seek target"),
        TestCase::new("UnderflowRecovery", PLAYBACK, underflow_recovery)
            .streams(&["video"])
            .title("A stall from underflow recovers once data arrives"),
        TestCase::new("EndOfStreamDuration", PLAYBACK, end_of_stream_duration)
            .streams(&["video"])
            .title("End of stream sets duration to the buffered end"),
        TestCase::new("PlaybackEnded", PLAYBACK, playback_ended)
            .streams(&["video"])
            .title("Playback reaches ended after end of stream"),
    ]
}

async fn play_through_av(env: TestEnv) -> Result<()> {
    const TARGET: f64 = 3.0;

    let ctx = &env.ctx;
    let video = env.add_buffer("video")?;
    let audio = env.add_buffer("audio")?;
    let mut video_source = env.source("video")?;
    let mut audio_source = env.source("audio")?;

    append_init(ctx, video.as_ref(), &mut video_source, 0.0).await?;
    append_init(ctx, audio.as_ref(), &mut audio_source, 0.0).await?;

    play_through(
        ctx,
        env.element(),
        0.0,
        TARGET,
        Feed::new(video.as_ref(), &mut video_source),
        Some(Feed::new(audio.as_ref(), &mut audio_source)),
    )
    .await?;

    ctx.check_ge("currentTime", env.element().current_time(), TARGET)?;
    ctx.check_true("paused at target", env.element().paused())
}

async fn wait_until_playing(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_until(ctx, buffer.as_ref(), &mut source, 3.0).await?;

    env.element().play();
    wait_until(ctx, env.element(), 2.0).await?;
    env.element().pause();

    ctx.check_ge("currentTime", env.element().current_time(), 2.0)
}

async fn playback_after_seek(env: TestEnv) -> Result<()> {
    const FROM: f64 = 4.0;
    const TO: f64 = 6.0;

    let ctx = &env.ctx;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_until(ctx, buffer.as_ref(), &mut source, 1.0).await?;
    source.seek(FROM, Some(buffer.as_ref())).await?;

    play_through(
        ctx,
        env.element(),
        FROM,
        TO,
        Feed::new(buffer.as_ref(), &mut source),
        None,
    )
    .await?;

    let start = buffer.buffered().get(0).map(|r| r.start).unwrap_or(f64::NAN);
    ctx.check_approx(
        "buffered.start(0)",
        start,
        FROM,
        ctx.config().playback.time_tolerance,
    )?;
    ctx.check_ge("currentTime", env.element().current_time(), TO)
}

async fn underflow_recovery(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_until(ctx, buffer.as_ref(), &mut source, 1.0).await?;
    let buffered_end = buffer.buffered().first_end().unwrap_or(0.0);

    let mut events = env.element().subscribe();
    env.element().play();
    wait_media_event(ctx, &mut events, "waiting", |e| {
        matches!(e, MediaEvent::Waiting { .. })
    })
    .await?;
    drop(events);

    let stalled_at = env.element().current_time();
    ctx.check_le("stall position", stalled_at, buffered_end + tolerance)?;

    play_through(
        ctx,
        env.element(),
        stalled_at,
        stalled_at + 2.0,
        Feed::new(buffer.as_ref(), &mut source),
        None,
    )
    .await?;
    ctx.check_ge("currentTime after recovery", env.element().current_time(), stalled_at + 2.0)
}

/// Appends every remaining media chunk of `source`.
async fn append_all(env: &TestEnv, buffer: &dyn SourceBuffer, source: &mut dyn SegmentSource) -> Result<()> {
    while !source.is_exhausted() {
        let chunk = source.pull().await?;
        append_and_wait(&env.ctx, buffer, chunk).await?;
    }
    Ok(())
}

async fn end_of_stream_duration(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let descriptor = env.stream("video")?;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_all(&env, buffer.as_ref(), &mut source).await?;
    let buffered_end = buffer.buffered().last_end().unwrap_or(0.0);

    let mut events = env.element().subscribe();
    env.media_source().end_of_stream()?;
    wait_media_event(ctx, &mut events, "sourceended", |e| {
        matches!(e, MediaEvent::SourceEnded)
    })
    .await?;

    ctx.check_eq(
        "mediaSource.readyState",
        env.media_source().ready_state(),
        SourceReadyState::Ended,
    )?;
    ctx.check_approx("mediaSource.duration", env.media_source().duration(), buffered_end, tolerance)?;
    if let Some(expected) = descriptor.expected("duration") {
        ctx.check_approx("duration vs fixture", env.media_source().duration(), expected, tolerance)?;
    }
    Ok(())
}

async fn playback_ended(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_all(&env, buffer.as_ref(), &mut source).await?;
    env.media_source().end_of_stream()?;

    let duration = env.media_source().duration();
    let mut events = env.element().subscribe();
    env.element().set_current_time((duration - 1.0).max(0.0));
    env.element().play();
    wait_media_event(ctx, &mut events, "ended", |e| matches!(e, MediaEvent::Ended)).await?;

    ctx.check_approx(
        "currentTime at end",
        env.element().current_time(),
        duration,
        ctx.config().playback.time_tolerance,
    )
}
