//! Error taxonomy for conformance tests.

use std::time::Duration;

use thiserror::Error;

use crate::host::HostError;
use crate::source::SourceError;

/// Everything that can end a conformance test early.
///
/// [`ConformError::Timeout`] is classified separately from every other
/// variant so slow hosts are distinguishable from broken ones.
#[derive(Debug, Error)]
pub enum ConformError {
    /// A checked value did not match its expectation
    #[error("{what}: expected {expected}, got {actual}")]
    Check {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The host reported an error event for an operation
    #[error("{operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    /// A bounded wait elapsed without reaching its target
    #[error("timed out waiting for {what} after {elapsed:?}")]
    Timeout { what: String, elapsed: Duration },

    /// The host cannot run the suite at all
    #[error("fatal setup error: {reason}")]
    FatalSetup { reason: String },

    #[error("stream not supported by host: {type_string}")]
    UnsupportedStream { type_string: String },

    #[error("stream role not in catalog: {role}")]
    MissingStream { role: String },

    /// The host event channel closed while an operation was pending
    #[error("event channel closed while waiting for {what}")]
    ChannelClosed { what: String },
}

impl ConformError {
    /// Builds a [`ConformError::Check`] from any displayable values.
    pub fn check(
        what: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        ConformError::Check {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn timeout(what: impl Into<String>, elapsed: Duration) -> Self {
        ConformError::Timeout {
            what: what.into(),
            elapsed,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ConformError::Timeout { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ConformError::FatalSetup { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConformError>;
