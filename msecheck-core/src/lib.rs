//! msecheck core - conformance drivers for segmented media buffers
//!
//! This crate provides the reusable orchestration layer of the suite:
//! restartable segment sources with decorators, append and playback drivers
//! that turn host events into awaitable completion points, outcome
//! classification and the built-in test case registry.

pub mod config;
pub mod context;
pub mod drivers;
pub mod error;
pub mod fetch;
pub mod host;
pub mod outcome;
pub mod source;
pub mod stream;
pub mod suite;
pub mod time_ranges;
pub mod tracing_setup;

#[cfg(test)]
mod test_support;

// Re-export main types for convenient access
pub use config::{DoubleAppendPolicy, MsecheckConfig};
pub use context::TestContext;
pub use error::{ConformError, Result};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use host::{Host, HostError, MediaElement, MediaSource, PlaybackContext, SourceBuffer};
pub use outcome::{Outcome, OutcomeError, ResultHandle};
pub use source::{RangeSource, SegmentSource, SourceError, SourceExt};
pub use stream::{MediaKind, SegmentInfo, StreamCatalog, StreamDescriptor};
pub use suite::{SuiteFilter, SuiteReport, SuiteRunner, TestCase, TestEnv, TestSuite};
pub use time_ranges::{TimeRange, TimeRanges};
