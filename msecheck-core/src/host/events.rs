//! Events emitted by host buffers and playback contexts.

/// Events fired by a source buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent {
    /// An append or remove finished successfully
    Update,
    /// An append or remove ended, successfully or not
    UpdateEnd,
    /// An append failed; `UpdateEnd` follows
    Error { reason: String },
    /// An in-flight operation was aborted; `UpdateEnd` follows
    Abort,
}

impl BufferEvent {
    /// Returns string representation of event type for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferEvent::Update => "update",
            BufferEvent::UpdateEnd => "updateend",
            BufferEvent::Error { .. } => "error",
            BufferEvent::Abort => "abort",
        }
    }
}

/// Events fired by the media element and its attached media source.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    TimeUpdate { current_time: f64 },
    DurationChange { duration: f64 },
    LoadedMetadata,
    Play,
    Pause,
    Seeking { target: f64 },
    Seeked { current_time: f64 },
    /// Playback stalled because no data is buffered at the playhead
    Waiting { current_time: f64 },
    Ended,
    SourceOpen,
    SourceEnded,
    SourceClose,
}

impl MediaEvent {
    /// Returns string representation of event type for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaEvent::TimeUpdate { .. } => "timeupdate",
            MediaEvent::DurationChange { .. } => "durationchange",
            MediaEvent::LoadedMetadata => "loadedmetadata",
            MediaEvent::Play => "play",
            MediaEvent::Pause => "pause",
            MediaEvent::Seeking { .. } => "seeking",
            MediaEvent::Seeked { .. } => "seeked",
            MediaEvent::Waiting { .. } => "waiting",
            MediaEvent::Ended => "ended",
            MediaEvent::SourceOpen => "sourceopen",
            MediaEvent::SourceEnded => "sourceended",
            MediaEvent::SourceClose => "sourceclose",
        }
    }
}

/// How a buffer operation ended, as observed on its event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateCompletion {
    /// `Update` then `UpdateEnd`
    Completed,
    /// `Error` then `UpdateEnd`
    Failed { reason: String },
    /// `Abort` then `UpdateEnd`
    Aborted,
}

/// Waits for the next `UpdateEnd` on `events`, remembering whether an
/// `Error` or `Abort` preceded it.
///
/// Returns `None` if the channel closed first. Lagged receivers skip ahead;
/// `UpdateEnd` is always the last event of an operation so nothing terminal
/// is lost.
pub async fn wait_update_end(
    events: &mut tokio::sync::broadcast::Receiver<BufferEvent>,
) -> Option<UpdateCompletion> {
    use tokio::sync::broadcast::error::RecvError;

    let mut completion = UpdateCompletion::Completed;
    loop {
        match events.recv().await {
            Ok(BufferEvent::UpdateEnd) => return Some(completion),
            Ok(BufferEvent::Error { reason }) => completion = UpdateCompletion::Failed { reason },
            Ok(BufferEvent::Abort) => completion = UpdateCompletion::Aborted,
            Ok(BufferEvent::Update) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Buffer event receiver lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
