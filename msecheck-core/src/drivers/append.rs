//! Append driver: feeds source chunks into a buffer one update at a time.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::try_join_all;

use super::events::wait_update;
use crate::context::TestContext;
use crate::error::{ConformError, Result};
use crate::host::{HostError, MediaSource, SourceBuffer};
use crate::source::SegmentSource;

/// Appends `chunk` and waits for its `updateend`.
///
/// The listener is registered before the append is issued and dropped once
/// the operation ends, so each call owns exactly one listener.
///
/// # Errors
///
/// - `ConformError::Host` - The buffer rejected the append (e.g. busy)
/// - `ConformError::OperationFailed` - The append completed with an error
/// - `ConformError::Timeout` - No `updateend` within the event timeout
pub async fn append_and_wait(ctx: &TestContext, buffer: &dyn SourceBuffer, chunk: Bytes) -> Result<()> {
    let mut events = buffer.subscribe();
    let len = chunk.len();
    buffer.append_buffer(chunk)?;
    wait_update(ctx, &mut events, "append").await?;

    tracing::trace!(
        test = ctx.name(),
        mime = buffer.mime_type(),
        len,
        buffered = %buffer.buffered(),
        "Append completed"
    );
    Ok(())
}

/// Appends the source's init chunk and positions the source at `start_time`.
///
/// # Errors
///
/// - `ConformError::Source` - Fetching the init chunk failed
/// - Any error of [`append_and_wait`]
pub async fn append_init<S>(
    ctx: &TestContext,
    buffer: &dyn SourceBuffer,
    source: &mut S,
    start_time: f64,
) -> Result<()>
where
    S: SegmentSource + ?Sized,
{
    let chunk = source.init(None).await?;
    tracing::debug!(
        test = ctx.name(),
        mime = buffer.mime_type(),
        len = chunk.len(),
        "Appending init segment"
    );
    append_and_wait(ctx, buffer, chunk).await?;

    if start_time > 0.0 {
        source.seek(start_time, None).await?;
    }
    Ok(())
}

/// Pulls and appends until the first buffered range ends at or after `target`.
///
/// Never returns `Ok` with the first range ending before `target`.
///
/// # Errors
///
/// - `ConformError::Check` - The source ran out before reaching `target`
/// - `ConformError::Timeout` - The iteration cap was hit first
/// - Any error of [`append_and_wait`] or the source
pub async fn append_until<S>(
    ctx: &TestContext,
    buffer: &dyn SourceBuffer,
    source: &mut S,
    target: f64,
) -> Result<()>
where
    S: SegmentSource + ?Sized,
{
    let max_iterations = ctx.config().append.max_append_iterations;
    let started = Instant::now();

    for iteration in 0..=max_iterations {
        let end = buffer.buffered().first_end().unwrap_or(0.0);
        if end >= target {
            tracing::debug!(test = ctx.name(), target, end, iteration, "Append target reached");
            return Ok(());
        }
        if iteration == max_iterations {
            break;
        }

        let chunk = match source.pull().await {
            Ok(chunk) => chunk,
            Err(e) if e.is_exhausted() => {
                return Err(ConformError::check(
                    "first buffered range end when source ran out",
                    format!(">= {target:.3}"),
                    format!("{end:.3}"),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        append_and_wait(ctx, buffer, chunk).await?;
    }

    Err(ConformError::timeout(
        format!("buffered end >= {target:.3} within {max_iterations} appends"),
        started.elapsed(),
    ))
}

/// Attempts an append, reporting the busy condition as `Ok(false)`.
///
/// # Errors
///
/// - `HostError` - Any rejection other than the busy condition
pub fn safe_append(buffer: &dyn SourceBuffer, chunk: Bytes) -> std::result::Result<bool, HostError> {
    match buffer.append_buffer(chunk) {
        Ok(()) => Ok(true),
        Err(e) if e.is_busy() => {
            tracing::debug!(mime = buffer.mime_type(), "Append rejected: buffer busy");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Sets the duration and joins on every buffer the change started updating.
///
/// Resumes only after all of them have fired `updateend`, in whatever order
/// they complete.
///
/// # Errors
///
/// - `ConformError::Host` - The media source rejected the new duration
/// - Any error of a buffer's update wait
pub async fn set_duration(
    ctx: &TestContext,
    media_source: &dyn MediaSource,
    buffers: &[Arc<dyn SourceBuffer>],
    duration: f64,
) -> Result<()> {
    let mut listeners: Vec<_> = buffers.iter().map(|b| b.subscribe()).collect();
    media_source.set_duration(duration)?;

    let pending: Vec<_> = buffers
        .iter()
        .zip(listeners.iter_mut())
        .filter(|(buffer, _)| buffer.updating())
        .map(|(_, events)| wait_update(ctx, events, "duration change"))
        .collect();

    tracing::debug!(
        test = ctx.name(),
        duration,
        updating = pending.len(),
        "Duration set, joining buffer updates"
    );
    try_join_all(pending).await?;
    Ok(())
}
