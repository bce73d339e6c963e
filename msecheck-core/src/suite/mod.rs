//! Test case registry.
//!
//! A [`TestCase`] is declarative metadata plus an async entry point. The
//! [`runner`] opens a fresh playback context per case, resolves the case's
//! stream roles and classifies whatever the entry point returns.

pub mod cases;
pub mod runner;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::context::TestContext;
use crate::error::{ConformError, Result};
use crate::fetch::Fetcher;
use crate::host::{MediaElement, MediaSource, PlaybackContext, SourceBuffer};
use crate::source::RangeSource;
use crate::stream::StreamDescriptor;

pub use runner::{SuiteReport, SuiteRunner, TestReport};

/// Everything a test body receives once its playback context is open.
pub struct TestEnv {
    pub ctx: TestContext,
    pub playback: PlaybackContext,
    streams: HashMap<String, Arc<StreamDescriptor>>,
    fetcher: Arc<dyn Fetcher>,
}

impl TestEnv {
    pub fn new(
        ctx: TestContext,
        playback: PlaybackContext,
        streams: HashMap<String, Arc<StreamDescriptor>>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            ctx,
            playback,
            streams,
            fetcher,
        }
    }

    pub fn element(&self) -> &dyn MediaElement {
        self.playback.element.as_ref()
    }

    pub fn media_source(&self) -> &dyn MediaSource {
        self.playback.media_source.as_ref()
    }

    /// Descriptor resolved for `role`.
    ///
    /// # Errors
    ///
    /// - `ConformError::MissingStream` - The case did not declare `role`
    pub fn stream(&self, role: &str) -> Result<Arc<StreamDescriptor>> {
        self.streams
            .get(role)
            .cloned()
            .ok_or_else(|| ConformError::MissingStream {
                role: role.to_string(),
            })
    }

    /// Fresh base source for `role`.
    ///
    /// # Errors
    ///
    /// - `ConformError::MissingStream` - The case did not declare `role`
    pub fn source(&self, role: &str) -> Result<RangeSource> {
        let descriptor = self.stream(role)?;
        Ok(RangeSource::new(
            descriptor,
            Arc::clone(&self.fetcher),
            self.ctx.config().append.default_pull_size,
        ))
    }

    /// Adds a buffer for the stream behind `role`.
    ///
    /// # Errors
    ///
    /// - `ConformError::MissingStream` - The case did not declare `role`
    /// - `ConformError::Host` - The media source refused the type
    pub fn add_buffer(&self, role: &str) -> Result<Arc<dyn SourceBuffer>> {
        let descriptor = self.stream(role)?;
        let buffer = self
            .playback
            .media_source
            .add_source_buffer(&descriptor.type_string())?;
        Ok(buffer)
    }
}

pub type TestFuture = BoxFuture<'static, Result<()>>;
pub type TestFn = Arc<dyn Fn(TestEnv) -> TestFuture + Send + Sync>;

/// One registered conformance test.
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub category: String,
    pub mandatory: bool,
    pub streams: Vec<String>,
    pub title: String,
    pub timeout: Option<Duration>,
    entry: TestFn,
}

impl TestCase {
    pub fn new<F, Fut>(name: &str, category: &str, entry: F) -> Self
    where
        F: Fn(TestEnv) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            mandatory: true,
            streams: Vec::new(),
            title: name.to_string(),
            timeout: None,
            entry: Arc::new(move |env| Box::pin(entry(env))),
        }
    }

    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }

    pub fn streams(mut self, roles: &[&str]) -> Self {
        self.streams = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Starts the test body.
    pub fn start(&self, env: TestEnv) -> TestFuture {
        (self.entry)(env)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("mandatory", &self.mandatory)
            .field("streams", &self.streams)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Case selection for a run. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct SuiteFilter {
    /// Case-insensitive substring of the test name
    pub name: Option<String>,
    /// Exact category, case-insensitive
    pub category: Option<String>,
}

impl SuiteFilter {
    pub fn matches(&self, case: &TestCase) -> bool {
        let name_ok = self
            .name
            .as_ref()
            .is_none_or(|n| case.name.to_lowercase().contains(&n.to_lowercase()));
        let category_ok = self
            .category
            .as_ref()
            .is_none_or(|c| case.category.eq_ignore_ascii_case(c));
        name_ok && category_ok
    }
}

/// Ordered collection of registered cases.
#[derive(Debug, Default, Clone)]
pub struct TestSuite {
    cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suite with every built-in case registered.
    pub fn builtin() -> Self {
        let mut suite = Self::new();
        cases::register_all(&mut suite);
        suite
    }

    /// Adds `case`, replacing an earlier case of the same name.
    pub fn register(&mut self, case: TestCase) -> &mut Self {
        if let Some(existing) = self.cases.iter_mut().find(|c| c.name == case.name) {
            tracing::warn!(test = %case.name, "Replacing registered test case");
            *existing = case;
        } else {
            self.cases.push(case);
        }
        self
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Distinct categories in registration order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for case in &self.cases {
            if !seen.contains(&case.category.as_str()) {
                seen.push(&case.category);
            }
        }
        seen
    }

    pub fn filter(&self, filter: &SuiteFilter) -> Vec<&TestCase> {
        self.cases.iter().filter(|c| filter.matches(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str, category: &str) -> TestCase {
        TestCase::new(name, category, |_env| async { Ok(()) })
    }

    #[test]
    fn test_builder_sets_metadata() {
        let case = noop("AppendInit", "MSE Core")
            .optional()
            .streams(&["video"])
            .title("Init segment appends")
            .timeout(Duration::from_secs(5));

        assert!(!case.mandatory);
        assert_eq!(case.streams, vec!["video".to_string()]);
        assert_eq!(case.title, "Init segment appends");
        assert_eq!(case.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut suite = TestSuite::new();
        suite.register(noop("A", "MSE Core"));
        suite.register(noop("B", "MSE Core"));
        suite.register(noop("A", "MSE Playback"));

        assert_eq!(suite.len(), 2);
        assert_eq!(suite.get("A").unwrap().category, "MSE Playback");
        assert_eq!(suite.categories(), vec!["MSE Playback", "MSE Core"]);
    }

    #[test]
    fn test_filter_by_name_and_category() {
        let mut suite = TestSuite::new();
        suite
            .register(noop("AppendInit", "MSE Core"))
            .register(noop("AppendUntil", "MSE Core"))
            .register(noop("PlayThrough", "MSE Playback"));

        let by_name = SuiteFilter {
            name: Some("append".to_string()),
            category: None,
        };
        assert_eq!(suite.filter(&by_name).len(), 2);

        let by_category = SuiteFilter {
            name: None,
            category: Some("mse playback".to_string()),
        };
        let names: Vec<&str> = suite
            .filter(&by_category)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["PlayThrough"]);

        assert_eq!(suite.filter(&SuiteFilter::default()).len(), 3);
    }

    #[test]
    fn test_builtin_suite_has_both_categories() {
        let suite = TestSuite::builtin();
        assert!(!suite.is_empty());
        assert_eq!(suite.categories(), vec!["MSE Core", "MSE Playback"]);
    }
}
