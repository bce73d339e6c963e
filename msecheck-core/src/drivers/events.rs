//! Time-boxed waits on host event channels.

use std::time::Instant;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::context::TestContext;
use crate::error::{ConformError, Result};
use crate::host::{BufferEvent, MediaEvent, UpdateCompletion, wait_update_end};

/// Waits for the operation observed by `events` to end, bounded by the
/// configured event timeout.
///
/// # Errors
///
/// - `ConformError::OperationFailed` - The host fired `error` or `abort`
/// - `ConformError::Timeout` - No `updateend` within the event timeout
/// - `ConformError::ChannelClosed` - The buffer went away
pub async fn wait_update(
    ctx: &TestContext,
    events: &mut broadcast::Receiver<BufferEvent>,
    operation: &str,
) -> Result<()> {
    let limit = ctx.config().timeouts.event_timeout;

    match tokio::time::timeout(limit, wait_update_end(events)).await {
        Ok(Some(UpdateCompletion::Completed)) => Ok(()),
        Ok(Some(UpdateCompletion::Failed { reason })) => Err(ConformError::OperationFailed {
            operation: operation.to_string(),
            reason,
        }),
        Ok(Some(UpdateCompletion::Aborted)) => Err(ConformError::OperationFailed {
            operation: operation.to_string(),
            reason: "aborted".to_string(),
        }),
        Ok(None) => Err(ConformError::ChannelClosed {
            what: format!("{operation} updateend"),
        }),
        Err(_) => Err(ConformError::timeout(format!("{operation} updateend"), limit)),
    }
}

/// Waits for the first media event matching `predicate`, bounded by the
/// configured event timeout.
///
/// # Errors
///
/// - `ConformError::Timeout` - No matching event within the event timeout
/// - `ConformError::ChannelClosed` - The element went away
pub async fn wait_media_event<F>(
    ctx: &TestContext,
    events: &mut broadcast::Receiver<MediaEvent>,
    what: &str,
    mut predicate: F,
) -> Result<MediaEvent>
where
    F: FnMut(&MediaEvent) -> bool + Send,
{
    let limit = ctx.config().timeouts.event_timeout;
    let started = Instant::now();

    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Ok(event),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    return Err(ConformError::ChannelClosed {
                        what: what.to_string(),
                    });
                }
            }
        }
    };

    tokio::time::timeout(limit, wait)
        .await
        .map_err(|_| ConformError::timeout(what, started.elapsed()))?
}
