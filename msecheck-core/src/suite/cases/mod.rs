//! Built-in conformance cases.

mod buffering;
mod playback;

use crate::context::TestContext;
use crate::drivers::append_and_wait;
use crate::error::Result;
use crate::host::SourceBuffer;
use crate::source::SegmentSource;

use super::TestSuite;

pub const CORE: &str = "MSE Core";
pub const PLAYBACK: &str = "MSE Playback";

/// Registers every built-in case on `suite`.
pub fn register_all(suite: &mut TestSuite) {
    for case in buffering::cases() {
        suite.register(case);
    }
    for case in playback::cases() {
        suite.register(case);
    }
}

/// Pulls and appends exactly `count` media chunks.
async fn append_chunks<S>(
    ctx: &TestContext,
    buffer: &dyn SourceBuffer,
    source: &mut S,
    count: usize,
) -> Result<()>
where
    S: SegmentSource + ?Sized,
{
    for _ in 0..count {
        let chunk = source.pull().await?;
        append_and_wait(ctx, buffer, chunk).await?;
    }
    Ok(())
}
