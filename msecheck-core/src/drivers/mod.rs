//! Async drivers that sequence host operations for test bodies.
//!
//! Each driver resolves once its target condition holds and returns an error
//! otherwise, so a test body reads as a straight line of awaits. Every
//! operation subscribes to its events before it is issued and drops the
//! subscription when it ends.

mod append;
mod events;
mod playback;

pub use append::{append_and_wait, append_init, append_until, safe_append, set_duration};
pub use events::{wait_media_event, wait_update};
pub use playback::{Feed, play_through, wait_until};
