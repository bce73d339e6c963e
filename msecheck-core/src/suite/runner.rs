//! Sequential suite runner and its serializable report.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::{SuiteFilter, TestCase, TestEnv, TestSuite};
use crate::config::MsecheckConfig;
use crate::context::TestContext;
use crate::error::{ConformError, Result};
use crate::host::Host;
use crate::outcome::Outcome;
use crate::stream::{StreamCatalog, StreamDescriptor};

/// Result of one test instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub name: String,
    pub category: String,
    pub title: String,
    pub mandatory: bool,
    /// Set when a required stream was unsupported and the case was demoted
    pub demoted: bool,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

/// Results of a whole run, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    pub host: String,
    pub tests: Vec<TestReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Pass))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Fail(_)))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Timeout(_)))
    }

    /// Mandatory tests that did not pass.
    pub fn mandatory_failures(&self) -> Vec<&TestReport> {
        self.tests
            .iter()
            .filter(|t| t.mandatory && !t.outcome.is_pass())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.tests.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Runs cases one at a time against a host.
pub struct SuiteRunner {
    host: Arc<dyn Host>,
    catalog: Arc<StreamCatalog>,
    config: Arc<MsecheckConfig>,
}

impl SuiteRunner {
    pub fn new(host: Arc<dyn Host>, catalog: Arc<StreamCatalog>, config: MsecheckConfig) -> Self {
        Self {
            host,
            catalog,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MsecheckConfig {
        &self.config
    }

    /// Runs every case of `suite` selected by `filter`.
    ///
    /// One case failing never stops the others.
    ///
    /// # Errors
    ///
    /// - `ConformError::FatalSetup` - The host has no segmented-append support
    pub async fn run(&self, suite: &TestSuite, filter: &SuiteFilter) -> Result<SuiteReport> {
        if !self.host.supports_media_source() {
            tracing::error!(host = self.host.name(), "Host lacks segmented append support");
            return Err(ConformError::FatalSetup {
                reason: format!("{} does not support media sources", self.host.name()),
            });
        }

        let selected = suite.filter(filter);
        tracing::info!(
            host = self.host.name(),
            selected = selected.len(),
            total = suite.len(),
            "Starting conformance run"
        );

        let mut report = SuiteReport {
            host: self.host.name().to_string(),
            tests: Vec::with_capacity(selected.len()),
        };
        for case in selected {
            report.tests.push(self.run_case(case).await);
        }

        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            timed_out = report.timed_out(),
            "Conformance run finished"
        );
        Ok(report)
    }

    /// Runs a single case within its time budget.
    pub async fn run_case(&self, case: &TestCase) -> TestReport {
        let ctx = TestContext::new(&case.name, Arc::clone(&self.config));
        let started = Instant::now();
        let budget = case
            .timeout
            .unwrap_or(self.config.timeouts.default_test_timeout);

        let mut mandatory = case.mandatory;
        let mut demoted = false;

        let result = match self.resolve_streams(case) {
            Ok(streams) => self.execute(case, ctx.clone(), streams, budget).await,
            Err(e) => {
                if matches!(e, ConformError::UnsupportedStream { .. }) {
                    tracing::warn!(test = %case.name, error = %e, "Demoting test to optional");
                    mandatory = false;
                    demoted = true;
                }
                Err(e)
            }
        };

        let outcome = Outcome::from_result(&result);
        let outcome = if result.is_ok() && ctx.result().is_reported() {
            ctx.result().outcome().unwrap_or(outcome)
        } else {
            match ctx.result().report(outcome.clone()) {
                Ok(()) => outcome,
                // Reporting after a terminal outcome is a test bug.
                Err(e) => Outcome::Fail(e.to_string()),
            }
        };

        let duration = started.elapsed();
        tracing::info!(
            test = %case.name,
            outcome = %outcome,
            duration_ms = duration.as_millis() as u64,
            "Test finished"
        );

        TestReport {
            name: case.name.clone(),
            category: case.category.clone(),
            title: case.title.clone(),
            mandatory,
            demoted,
            outcome,
            duration_ms: duration.as_millis() as u64,
        }
    }

    fn resolve_streams(&self, case: &TestCase) -> Result<HashMap<String, Arc<StreamDescriptor>>> {
        let mut streams = HashMap::with_capacity(case.streams.len());
        for role in &case.streams {
            let descriptor = self
                .catalog
                .get(role)
                .ok_or_else(|| ConformError::MissingStream { role: role.clone() })?;

            let type_string = descriptor.type_string();
            if !self.host.is_type_supported(&type_string) {
                return Err(ConformError::UnsupportedStream { type_string });
            }
            streams.insert(role.clone(), descriptor);
        }
        Ok(streams)
    }

    async fn execute(
        &self,
        case: &TestCase,
        ctx: TestContext,
        streams: HashMap<String, Arc<StreamDescriptor>>,
        budget: Duration,
    ) -> Result<()> {
        let body = async {
            let playback = self.host.open().await?;
            let env = TestEnv::new(ctx, playback, streams, self.host.fetcher());
            tracing::debug!(test = %case.name, "Playback context open, starting body");
            case.start(env).await
        };

        let body = body.instrument(tracing::info_span!("test", name = %case.name));
        tokio::time::timeout(budget, body)
            .await
            .map_err(|_| ConformError::timeout(format!("test '{}' to finish", case.name), budget))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, mandatory: bool, outcome: Outcome) -> TestReport {
        TestReport {
            name: name.to_string(),
            category: "MSE Core".to_string(),
            title: name.to_string(),
            mandatory,
            demoted: false,
            outcome,
            duration_ms: 12,
        }
    }

    #[test]
    fn test_report_counts() {
        let suite = SuiteReport {
            host: "sim".to_string(),
            tests: vec![
                report("A", true, Outcome::Pass),
                report("B", true, Outcome::Fail("bad".to_string())),
                report("C", false, Outcome::Timeout("slow".to_string())),
                report("D", true, Outcome::Timeout("slow".to_string())),
            ],
        };

        assert_eq!(suite.passed(), 1);
        assert_eq!(suite.failed(), 1);
        assert_eq!(suite.timed_out(), 2);

        let names: Vec<&str> = suite
            .mandatory_failures()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["B", "D"]);
    }

    #[test]
    fn test_report_json_shape() {
        let suite = SuiteReport {
            host: "sim".to_string(),
            tests: vec![report("A", true, Outcome::Fail("bad".to_string()))],
        };

        let json: serde_json::Value = serde_json::from_str(&suite.to_json().unwrap()).unwrap();
        assert_eq!(json["host"], "sim");
        assert_eq!(json["tests"][0]["outcome"]["status"], "fail");
        assert_eq!(json["tests"][0]["outcome"]["reason"], "bad");
        assert_eq!(json["tests"][0]["mandatory"], true);
    }
}
