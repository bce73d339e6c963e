//! Buffering cases: appends, merges, removal and duration changes.

use super::{CORE, append_chunks};
use crate::config::DoubleAppendPolicy;
use crate::drivers::{
    append_and_wait, append_init, append_until, safe_append, set_duration, wait_media_event,
    wait_update,
};
use crate::error::{ConformError, Result};
use crate::host::{ElementReadyState, MediaEvent};
use crate::source::{SegmentSource, SourceExt};
use crate::suite::{TestCase, TestEnv};

/// Bytes per chunk in the fixed-chunk case; small enough to split segments.
const SMALL_CHUNK: usize = 1500;

pub(super) fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("AppendInit", CORE, append_init_segment)
            .streams(&["video"])
            .title("Init segment appends and exposes metadata"),
        TestCase::new("AppendUntil", CORE, append_until_target)
            .streams(&["video"])
            .title("Media appends extend a single buffered range"),
        TestCase::new("OverlapMerge", CORE, |env| timestamp_offset_merge(env, -0.1, 1))
            .streams(&["video"])
            .title("Overlapping append merges into one range"),
        TestCase::new("SmallGapMerge", CORE, |env| timestamp_offset_merge(env, 0.01, 1))
            .streams(&["video"])
            .title("Append after a tiny gap merges into one range"),
        TestCase::new("LargeGap", CORE, |env| timestamp_offset_merge(env, 0.3, 2))
            .streams(&["video"])
            .title("Append after a large gap starts a second range"),
        TestCase::new("DoubleAppend", CORE, double_append)
            .streams(&["video"])
            .title("Second append while updating is rejected or serialized"),
        TestCase::new("OutOfOrderAppend", CORE, out_of_order_append)
            .streams(&["video"])
            .title("Segments appended out of order fill gaps"),
        TestCase::new("AbortThenAppend", CORE, abort_then_append)
            .streams(&["video"])
            .title("Abort clears updating and later appends succeed"),
        TestCase::new("RemoveRange", CORE, remove_range)
            .streams(&["video"])
            .title("Removing a middle range splits the buffer"),
        TestCase::new("DurationReduction", CORE, duration_reduction)
            .streams(&["video", "audio"])
            .title("Reducing duration truncates every buffer"),
        TestCase::new("FixedChunkAppend", CORE, fixed_chunk_append)
            .streams(&["video"])
            .title("Segments split across appends parse correctly"),
        TestCase::new("StartAtSegment", CORE, start_at_segment)
            .streams(&["video"])
            .title("Appending from a later segment buffers from its start"),
        TestCase::new("SeekAndAppend", CORE, seek_and_append)
            .streams(&["video"])
            .title("Seeking the source clears the buffer and resumes appends"),
        TestCase::new("ReinitializeSource", CORE, reinitialize_source)
            .streams(&["video"])
            .title("Re-appending init and leading media keeps one range"),
    ]
}

async fn append_init_segment(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let descriptor = env.stream("video")?;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;
    let mut media_events = env.element().subscribe();

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    ctx.check_eq("buffered.length after init", buffer.buffered().len(), 0)?;
    ctx.check_true("updating cleared after init", !buffer.updating())?;

    if env.element().ready_state() < ElementReadyState::HaveMetadata {
        wait_media_event(ctx, &mut media_events, "loadedmetadata", |e| {
            matches!(e, MediaEvent::LoadedMetadata)
        })
        .await?;
    }

    if let Some(width) = descriptor.expected("width") {
        ctx.check_eq("videoWidth", env.element().video_width(), width as u32)?;
    }
    if let Some(height) = descriptor.expected("height") {
        ctx.check_eq("videoHeight", env.element().video_height(), height as u32)?;
    }
    Ok(())
}

async fn append_until_target(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_until(ctx, buffer.as_ref(), &mut source, 3.0).await?;

    let buffered = buffer.buffered();
    ctx.check_eq("buffered.length", buffered.len(), 1)?;
    ctx.check_ge("buffered.end(0)", buffered.first_end().unwrap_or(0.0), 3.0)
}

/// Appends two segments, aborts, re-appends them at `duration + gap` and
/// checks the resulting range layout.
async fn timestamp_offset_merge(env: TestEnv, gap: f64, expected_ranges: usize) -> Result<()> {
    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?.segment_limit(2);

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_chunks(ctx, buffer.as_ref(), &mut source, 2).await?;

    let first_pass = buffer.buffered();
    ctx.check_eq("buffered.length after first pass", first_pass.len(), 1)?;
    let duration = first_pass.last_end().unwrap_or(0.0);

    buffer.abort()?;
    ctx.check_true("updating cleared after abort", !buffer.updating())?;
    buffer.set_timestamp_offset(duration + gap)?;
    ctx.check_eq("timestampOffset", buffer.timestamp_offset(), duration + gap)?;
    source.seek(0.0, None).await?;
    append_chunks(ctx, buffer.as_ref(), &mut source, 2).await?;

    let buffered = buffer.buffered();
    ctx.check_eq("buffered.length", buffered.len(), expected_ranges)?;
    ctx.check_approx(
        "last buffered end",
        buffered.last_end().unwrap_or(0.0),
        2.0 * duration + gap,
        tolerance,
    )
}

async fn double_append(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let descriptor = env.stream("video")?;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    let chunk = source.pull().await?;
    let expected_end = descriptor
        .segments
        .first()
        .map(|s| s.end_time())
        .unwrap_or(descriptor.duration);

    let mut events = buffer.subscribe();
    buffer.append_buffer(chunk.clone())?;
    let accepted = safe_append(buffer.as_ref(), chunk)?;
    wait_update(ctx, &mut events, "first append").await?;

    if accepted {
        if ctx.config().append.double_append_policy == DoubleAppendPolicy::Strict {
            return Err(ConformError::check(
                "second append while updating",
                "busy rejection",
                "accepted",
            ));
        }
        while buffer.updating() {
            wait_update(ctx, &mut events, "second append").await?;
        }
    } else {
        ctx.check_true("updating cleared after first append", !buffer.updating())?;
    }

    let buffered = buffer.buffered();
    ctx.check_eq("buffered.length", buffered.len(), 1)?;
    ctx.check_approx(
        "buffered.end(0)",
        buffered.first_end().unwrap_or(0.0),
        expected_end,
        tolerance,
    )
}

async fn out_of_order_append(env: TestEnv) -> Result<()> {
    const ORDER: [usize; 5] = [0, 2, 1, 4, 3];

    let ctx = &env.ctx;
    let descriptor = env.stream("video")?;
    ctx.check_ge("segment count", descriptor.segment_count() as f64, ORDER.len() as f64)?;

    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;
    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;

    let mut segments = Vec::with_capacity(ORDER.len());
    for _ in 0..ORDER.len() {
        segments.push(source.pull().await?);
    }

    let mut counts = vec![buffer.buffered().len()];
    for index in ORDER {
        append_and_wait(ctx, buffer.as_ref(), segments[index].clone()).await?;
        counts.push(buffer.buffered().len());
    }

    ctx.check_eq("buffered.length after each append", counts, vec![0, 1, 2, 1, 2, 1])
}

async fn abort_then_append(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    let chunk = source.pull().await?;
    buffer.append_buffer(chunk)?;
    buffer.abort()?;
    ctx.check_true("updating cleared by abort", !buffer.updating())?;

    // Abort resets the parser; start again from the init segment.
    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    source.seek(0.0, None).await?;
    append_until(ctx, buffer.as_ref(), &mut source, 2.0).await?;

    let buffered = buffer.buffered();
    ctx.check_eq("buffered.length", buffered.len(), 1)?;
    let start = buffered.get(0).map(|r| r.start).unwrap_or(f64::NAN);
    ctx.check_approx("buffered.start(0)", start, 0.0, tolerance)
}

async fn remove_range(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_until(ctx, buffer.as_ref(), &mut source, 4.0).await?;

    let mut events = buffer.subscribe();
    buffer.remove(1.0, 2.0)?;
    wait_update(ctx, &mut events, "remove").await?;

    let buffered = buffer.buffered();
    ctx.check_eq("buffered.length after remove", buffered.len(), 2)?;
    let first_end = buffered.get(0).map(|r| r.end).unwrap_or(f64::NAN);
    let second_start = buffered.get(1).map(|r| r.start).unwrap_or(f64::NAN);
    ctx.check_approx("buffered.end(0)", first_end, 1.0, tolerance)?;
    ctx.check_approx("buffered.start(1)", second_start, 2.0, tolerance)
}

async fn duration_reduction(env: TestEnv) -> Result<()> {
    const REDUCED: f64 = 2.0;

    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let video = env.add_buffer("video")?;
    let audio = env.add_buffer("audio")?;
    let mut video_source = env.source("video")?;
    let mut audio_source = env.source("audio")?;

    append_init(ctx, video.as_ref(), &mut video_source, 0.0).await?;
    append_init(ctx, audio.as_ref(), &mut audio_source, 0.0).await?;
    append_until(ctx, video.as_ref(), &mut video_source, 4.0).await?;
    append_until(ctx, audio.as_ref(), &mut audio_source, 4.0).await?;

    let buffers = [video.clone(), audio.clone()];
    set_duration(ctx, env.media_source(), &buffers, REDUCED).await?;

    ctx.check_approx("mediaSource.duration", env.media_source().duration(), REDUCED, tolerance)?;
    for buffer in &buffers {
        ctx.check_true("updating cleared after truncation", !buffer.updating())?;
        ctx.check_le(
            &format!("{} buffered end", buffer.mime_type()),
            buffer.buffered().last_end().unwrap_or(0.0),
            REDUCED + tolerance,
        )?;
    }
    Ok(())
}

async fn fixed_chunk_append(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?.fixed_chunk_size(SMALL_CHUNK);

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_until(ctx, buffer.as_ref(), &mut source, 3.0).await?;

    let buffered = buffer.buffered();
    ctx.check_eq("buffered.length", buffered.len(), 1)?;
    ctx.check_ge("buffered.end(0)", buffered.first_end().unwrap_or(0.0), 3.0)
}

async fn start_at_segment(env: TestEnv) -> Result<()> {
    const START: f64 = 3.0;

    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let descriptor = env.stream("video")?;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?.seek_to_segment(START);

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_until(ctx, buffer.as_ref(), &mut source, START + 2.0).await?;

    let expected_start = descriptor
        .segments
        .iter()
        .find(|s| START < s.end_time())
        .map(|s| s.start)
        .unwrap_or(START);
    let start = buffer.buffered().get(0).map(|r| r.start).unwrap_or(f64::NAN);
    ctx.check_approx("buffered.start(0)", start, expected_start, tolerance)
}

async fn seek_and_append(env: TestEnv) -> Result<()> {
    const SEEK_TO: f64 = 5.0;

    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?;

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_until(ctx, buffer.as_ref(), &mut source, 2.0).await?;

    source.seek(SEEK_TO, Some(buffer.as_ref())).await?;
    ctx.check_true("updating cleared after seek", !buffer.updating())?;
    ctx.check_eq("buffered.length after seek", buffer.buffered().len(), 0)?;

    append_until(ctx, buffer.as_ref(), &mut source, SEEK_TO + 2.0).await?;
    let start = buffer.buffered().get(0).map(|r| r.start).unwrap_or(f64::NAN);
    ctx.check_approx("buffered.start(0)", start, SEEK_TO, tolerance)
}

async fn reinitialize_source(env: TestEnv) -> Result<()> {
    let ctx = &env.ctx;
    let tolerance = ctx.config().playback.time_tolerance;
    let descriptor = env.stream("video")?;
    let buffer = env.add_buffer("video")?;
    let mut source = env.source("video")?.reset_before_init();

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    append_chunks(ctx, buffer.as_ref(), &mut source, 3).await?;
    let end = buffer.buffered().last_end().unwrap_or(0.0);

    append_init(ctx, buffer.as_ref(), &mut source, 0.0).await?;
    ctx.check_eq("source position after re-init", source.position(), descriptor.init_size)?;
    append_chunks(ctx, buffer.as_ref(), &mut source, 1).await?;

    let buffered = buffer.buffered();
    ctx.check_eq("buffered.length", buffered.len(), 1)?;
    ctx.check_approx("buffered.end(0)", buffered.last_end().unwrap_or(0.0), end, tolerance)
}
