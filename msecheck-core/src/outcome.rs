//! Terminal test outcomes and the single-report result handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConformError;

/// Terminal result of one test instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail(String),
    Timeout(String),
}

impl Outcome {
    /// Classifies a test body's result.
    ///
    /// Timeouts stay distinct from failures so slow hosts can be told apart
    /// from broken ones.
    pub fn from_result(result: &Result<(), ConformError>) -> Self {
        match result {
            Ok(()) => Outcome::Pass,
            Err(e) if e.is_timeout() => Outcome::Timeout(e.to_string()),
            Err(e) => Outcome::Fail(e.to_string()),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail(_) => "fail",
            Outcome::Timeout(_) => "timeout",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail(reason) => write!(f, "FAIL: {reason}"),
            Outcome::Timeout(reason) => write!(f, "TIMEOUT: {reason}"),
        }
    }
}

/// Raised when a test reports a second terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutcomeError {
    #[error("test '{test}' already reported {first}, cannot report {attempted}")]
    AlreadyReported {
        test: String,
        first: Outcome,
        attempted: Outcome,
    },
}

/// Per-test handle accepting exactly one terminal outcome.
///
/// Cloning shares the slot, so a handle passed deep into a driver still
/// enforces the single-report rule for the whole test.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    test: Arc<str>,
    slot: Arc<Mutex<Option<Outcome>>>,
}

impl ResultHandle {
    pub fn new(test: &str) -> Self {
        Self {
            test: Arc::from(test),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Reports success.
    ///
    /// # Errors
    ///
    /// - `OutcomeError::AlreadyReported` - An outcome was already reported
    pub fn succeed(&self) -> Result<(), OutcomeError> {
        self.report(Outcome::Pass)
    }

    /// Reports failure with a human-readable reason.
    ///
    /// # Errors
    ///
    /// - `OutcomeError::AlreadyReported` - An outcome was already reported
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), OutcomeError> {
        self.report(Outcome::Fail(reason.into()))
    }

    /// Reports that the test's budget elapsed.
    ///
    /// # Errors
    ///
    /// - `OutcomeError::AlreadyReported` - An outcome was already reported
    pub fn time_out(&self, reason: impl Into<String>) -> Result<(), OutcomeError> {
        self.report(Outcome::Timeout(reason.into()))
    }

    /// Records `outcome` unless one is already present.
    ///
    /// # Errors
    ///
    /// - `OutcomeError::AlreadyReported` - An outcome was already reported
    pub fn report(&self, outcome: Outcome) -> Result<(), OutcomeError> {
        let mut slot = self.slot.lock();
        if let Some(first) = slot.as_ref() {
            tracing::error!(
                test = %self.test,
                first = %first,
                attempted = %outcome,
                "Test reported a second outcome"
            );
            return Err(OutcomeError::AlreadyReported {
                test: self.test.to_string(),
                first: first.clone(),
                attempted: outcome,
            });
        }

        tracing::debug!(test = %self.test, outcome = %outcome, "Test outcome recorded");
        *slot = Some(outcome);
        Ok(())
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.slot.lock().clone()
    }

    pub fn is_reported(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn test_name(&self) -> &str {
        &self.test
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_first_report_wins() {
        let handle = ResultHandle::new("AppendInit");
        handle.succeed().unwrap();

        let err = handle.fail("late failure").unwrap_err();
        assert_eq!(
            err,
            OutcomeError::AlreadyReported {
                test: "AppendInit".to_string(),
                first: Outcome::Pass,
                attempted: Outcome::Fail("late failure".to_string()),
            }
        );
        assert_eq!(handle.outcome(), Some(Outcome::Pass));
    }

    #[test]
    fn test_clones_share_the_slot() {
        let handle = ResultHandle::new("Shared");
        let clone = handle.clone();

        clone.time_out("budget elapsed").unwrap();
        assert!(handle.is_reported());
        assert!(handle.succeed().is_err());
    }

    #[test]
    fn test_from_result_separates_timeouts() {
        let timeout = Err(ConformError::timeout("updateend", Duration::from_secs(2)));
        let failure = Err(ConformError::check("buffered.length", 1, 2));

        assert!(matches!(Outcome::from_result(&timeout), Outcome::Timeout(_)));
        assert!(matches!(Outcome::from_result(&failure), Outcome::Fail(_)));
        assert_eq!(Outcome::from_result(&Ok(())), Outcome::Pass);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_string(&Outcome::Fail("bad".to_string())).unwrap();
        assert_eq!(json, r#"{"status":"fail","reason":"bad"}"#);
    }
}
