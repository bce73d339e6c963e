//! Playback driver: runs the element forward while keeping buffers fed.

use std::time::Instant;

use tokio::sync::broadcast::error::RecvError;

use super::append::append_and_wait;
use crate::context::TestContext;
use crate::error::{ConformError, Result};
use crate::host::{MediaElement, SourceBuffer};
use crate::source::SegmentSource;

/// A buffer paired with the source that feeds it during playback.
pub struct Feed<'a> {
    pub buffer: &'a dyn SourceBuffer,
    pub source: &'a mut dyn SegmentSource,
}

impl<'a> Feed<'a> {
    pub fn new(buffer: &'a dyn SourceBuffer, source: &'a mut dyn SegmentSource) -> Self {
        Self { buffer, source }
    }

    /// End of the buffered range at or just after `time`, or `time` itself
    /// when nothing is buffered there.
    fn buffered_ahead(&self, time: f64, tolerance: f64) -> f64 {
        self.buffer
            .buffered()
            .iter()
            .find(|r| r.start <= time + tolerance && r.end > time)
            .map(|r| r.end)
            .unwrap_or(time)
    }

    /// Appends until `target` is buffered past `time` or the source runs dry.
    async fn top_up(&mut self, ctx: &TestContext, time: f64, target: f64) -> Result<()> {
        let tolerance = ctx.config().playback.time_tolerance;
        let mut rounds = 0;

        while self.buffered_ahead(time, tolerance) < target && !self.source.is_exhausted() {
            if rounds >= ctx.config().append.max_append_iterations {
                return Err(ConformError::timeout(
                    format!("top-up of {} to {target:.3}", self.buffer.mime_type()),
                    ctx.elapsed(),
                ));
            }
            let chunk = self.source.pull().await?;
            append_and_wait(ctx, self.buffer, chunk).await?;
            rounds += 1;
        }
        Ok(())
    }
}

/// Plays from `from` until the element's current time reaches `to`.
///
/// On every progress event both feeds are topped up to the configured
/// lookahead. A stall from underflow is not an error: feeding continues until
/// the playback ceiling elapses. The element is paused once `to` is reached.
///
/// # Errors
///
/// - `ConformError::Timeout` - `to` was not reached within the playback ceiling
/// - Any append or source error raised while feeding
pub async fn play_through<'a>(
    ctx: &TestContext,
    element: &dyn MediaElement,
    from: f64,
    to: f64,
    primary: Feed<'a>,
    secondary: Option<Feed<'a>>,
) -> Result<()> {
    let config = &ctx.config().playback;
    let ceiling = config.playback_ceiling;
    let started = Instant::now();

    let mut feeds: Vec<Feed<'a>> = std::iter::once(primary).chain(secondary).collect();

    let run = async {
        let mut events = element.subscribe();

        if (element.current_time() - from).abs() > config.time_tolerance {
            for feed in feeds.iter_mut() {
                feed.source.seek(from, None).await?;
            }
            element.set_current_time(from);
        }

        for feed in feeds.iter_mut() {
            feed.top_up(ctx, from, from + config.lookahead).await?;
        }

        if element.paused() {
            element.play();
        }
        tracing::debug!(test = ctx.name(), from, to, "Playing through");

        loop {
            let now = element.current_time();
            if now >= to {
                element.pause();
                tracing::debug!(test = ctx.name(), now, "Play-through target reached");
                return Ok(());
            }

            for feed in feeds.iter_mut() {
                feed.top_up(ctx, now, now + config.lookahead).await?;
            }

            match events.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    return Err(ConformError::ChannelClosed {
                        what: "playback progress".to_string(),
                    });
                }
            }
        }
    };

    tokio::time::timeout(ceiling, run).await.map_err(|_| {
        ConformError::timeout(
            format!("playback to reach {to:.3}s (at {:.3}s)", element.current_time()),
            started.elapsed(),
        )
    })?
}

/// Resolves once the element's current time is at or past `target`.
///
/// Never fails on its own: a paused element leaves the wait pending and the
/// enclosing test's timeout decides the outcome.
///
/// # Errors
///
/// - `ConformError::ChannelClosed` - The element went away
pub async fn wait_until(ctx: &TestContext, element: &dyn MediaElement, target: f64) -> Result<()> {
    let mut events = element.subscribe();

    loop {
        let now = element.current_time();
        if now >= target {
            tracing::trace!(test = ctx.name(), now, target, "Wait target reached");
            return Ok(());
        }

        match events.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => {
                return Err(ConformError::ChannelClosed {
                    what: format!("current time >= {target:.3}"),
                });
            }
        }
    }
}
