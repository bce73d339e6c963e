//! Outcome classification by the suite runner.

use std::time::Duration;

use msecheck_core::drivers::wait_until;
use msecheck_core::{ConformError, MsecheckConfig, Outcome, SuiteFilter, TestCase, TestSuite};
use msecheck_sim::SimConfig;

use crate::common::runner;

fn suite_of(cases: Vec<TestCase>) -> TestSuite {
    let mut suite = TestSuite::new();
    for case in cases {
        suite.register(case);
    }
    suite
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_distinct_from_failure() {
    let suite = suite_of(vec![
        TestCase::new("passes", "Runner", |_env| async { Ok(()) }),
        TestCase::new("fails", "Runner", |env| async move {
            env.ctx.check_eq("answer", 41, 42)
        }),
        TestCase::new("stalls", "Runner", |env| async move {
            wait_until(&env.ctx, env.element(), 100.0).await
        })
        .timeout(Duration::from_secs(2)),
    ]);

    let report = runner(SimConfig::instant(), MsecheckConfig::for_testing())
        .run(&suite, &SuiteFilter::default())
        .await
        .unwrap();

    assert_eq!(report.get("passes").unwrap().outcome, Outcome::Pass);
    assert!(matches!(report.get("fails").unwrap().outcome, Outcome::Fail(_)));
    assert!(matches!(report.get("stalls").unwrap().outcome, Outcome::Timeout(_)));
    assert_eq!((report.passed(), report.failed(), report.timed_out()), (1, 1, 1));
    assert_eq!(report.mandatory_failures().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_stream_demotes_case() {
    let suite = suite_of(vec![
        TestCase::new("needs_hevc", "Runner", |_env| async { Ok(()) })
            .streams(&["video_unsupported"]),
    ]);

    let report = runner(SimConfig::instant(), MsecheckConfig::for_testing())
        .run(&suite, &SuiteFilter::default())
        .await
        .unwrap();

    let test = report.get("needs_hevc").unwrap();
    assert!(test.demoted);
    assert!(!test.mandatory);
    assert!(matches!(test.outcome, Outcome::Fail(_)));
    assert!(report.mandatory_failures().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_stream_stays_mandatory() {
    let suite = suite_of(vec![
        TestCase::new("needs_subtitles", "Runner", |_env| async { Ok(()) })
            .streams(&["subtitles"]),
    ]);

    let report = runner(SimConfig::instant(), MsecheckConfig::for_testing())
        .run(&suite, &SuiteFilter::default())
        .await
        .unwrap();

    let test = report.get("needs_subtitles").unwrap();
    assert!(test.mandatory);
    assert!(!test.demoted);
    match &test.outcome {
        Outcome::Fail(reason) => assert!(reason.contains("subtitles")),
        other => panic!("expected failure, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_host_without_media_source_is_fatal() {
    let sim = SimConfig {
        media_source_supported: false,
        ..SimConfig::instant()
    };
    let err = runner(sim, MsecheckConfig::for_testing())
        .run(&TestSuite::builtin(), &SuiteFilter::default())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, ConformError::FatalSetup { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_reported_pass_is_kept_when_body_succeeds() {
    let suite = suite_of(vec![TestCase::new("reports_early", "Runner", |env| async move {
        env.ctx.result().succeed().unwrap();
        Ok(())
    })]);

    let report = runner(SimConfig::instant(), MsecheckConfig::for_testing())
        .run(&suite, &SuiteFilter::default())
        .await
        .unwrap();

    assert_eq!(report.get("reports_early").unwrap().outcome, Outcome::Pass);
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_reported_pass_is_not_masked() {
    let suite = suite_of(vec![TestCase::new("reports_twice", "Runner", |env| async move {
        env.ctx.result().succeed().unwrap();
        env.ctx.check_eq("late assertion", 1, 2)
    })]);

    let report = runner(SimConfig::instant(), MsecheckConfig::for_testing())
        .run(&suite, &SuiteFilter::default())
        .await
        .unwrap();

    let test = report.get("reports_twice").unwrap();
    match &test.outcome {
        Outcome::Fail(reason) => assert!(reason.contains("already reported"), "{reason}"),
        other => panic!("expected failure, got {other}"),
    }
    assert_eq!(report.mandatory_failures().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_filter_selects_subset_in_order() {
    let suite = suite_of(vec![
        TestCase::new("AlphaOne", "Group A", |_env| async { Ok(()) }),
        TestCase::new("BetaOne", "Group B", |_env| async { Ok(()) }),
        TestCase::new("AlphaTwo", "Group B", |_env| async { Ok(()) }),
    ]);
    let filter = SuiteFilter {
        name: Some("alpha".to_string()),
        category: Some("group b".to_string()),
    };

    let report = runner(SimConfig::instant(), MsecheckConfig::for_testing())
        .run(&suite, &filter)
        .await
        .unwrap();

    let names: Vec<&str> = report.tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["AlphaTwo"]);
}

#[tokio::test(start_paused = true)]
async fn test_report_serializes_outcomes() {
    let suite = suite_of(vec![TestCase::new("fails", "Runner", |env| async move {
        env.ctx.check_eq("answer", 1, 2)
    })]);

    let report = runner(SimConfig::instant(), MsecheckConfig::for_testing())
        .run(&suite, &SuiteFilter::default())
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["host"], "msecheck-sim");
    assert_eq!(json["tests"][0]["outcome"]["status"], "fail");
    assert!(json["tests"][0]["outcome"]["reason"]
        .as_str()
        .unwrap()
        .contains("answer"));
}
