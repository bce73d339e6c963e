//! Per-test context threaded through every driver call.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MsecheckConfig;
use crate::error::{ConformError, Result};
use crate::outcome::ResultHandle;

/// Explicit per-test state: name, configuration and result handle.
///
/// Assertions return `Err(ConformError::Check)` so test bodies propagate
/// failures with `?` instead of mutating a shared runner.
#[derive(Debug, Clone)]
pub struct TestContext {
    name: Arc<str>,
    config: Arc<MsecheckConfig>,
    result: ResultHandle,
    started: Instant,
}

impl TestContext {
    pub fn new(name: &str, config: Arc<MsecheckConfig>) -> Self {
        Self {
            name: Arc::from(name),
            config,
            result: ResultHandle::new(name),
            started: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &MsecheckConfig {
        &self.config
    }

    pub fn result(&self) -> &ResultHandle {
        &self.result
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fails unless `actual == expected`.
    ///
    /// # Errors
    ///
    /// - `ConformError::Check` - The values differ
    pub fn check_eq<T: PartialEq + Debug>(&self, what: &str, actual: T, expected: T) -> Result<()> {
        if actual == expected {
            return Ok(());
        }
        Err(ConformError::check(
            what,
            format!("{expected:?}"),
            format!("{actual:?}"),
        ))
    }

    /// Fails unless `|actual - expected| <= tolerance`.
    ///
    /// # Errors
    ///
    /// - `ConformError::Check` - The values differ by more than `tolerance`
    pub fn check_approx(&self, what: &str, actual: f64, expected: f64, tolerance: f64) -> Result<()> {
        if (actual - expected).abs() <= tolerance {
            return Ok(());
        }
        Err(ConformError::check(
            what,
            format!("{expected:.3} ± {tolerance}"),
            format!("{actual:.3}"),
        ))
    }

    /// Fails unless `actual >= minimum`.
    ///
    /// # Errors
    ///
    /// - `ConformError::Check` - `actual` is below `minimum`
    pub fn check_ge(&self, what: &str, actual: f64, minimum: f64) -> Result<()> {
        if actual >= minimum {
            return Ok(());
        }
        Err(ConformError::check(
            what,
            format!(">= {minimum:.3}"),
            format!("{actual:.3}"),
        ))
    }

    /// Fails unless `actual <= maximum`.
    ///
    /// # Errors
    ///
    /// - `ConformError::Check` - `actual` exceeds `maximum`
    pub fn check_le(&self, what: &str, actual: f64, maximum: f64) -> Result<()> {
        if actual <= maximum {
            return Ok(());
        }
        Err(ConformError::check(
            what,
            format!("<= {maximum:.3}"),
            format!("{actual:.3}"),
        ))
    }

    /// Fails unless `condition` holds.
    ///
    /// # Errors
    ///
    /// - `ConformError::Check` - `condition` is false
    pub fn check_true(&self, what: &str, condition: bool) -> Result<()> {
        self.check_eq(what, condition, true)
    }
}
