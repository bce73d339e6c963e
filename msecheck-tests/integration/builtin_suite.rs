//! The builtin suite end to end on the simulated host.

use msecheck_core::{DoubleAppendPolicy, MsecheckConfig, Outcome, SuiteFilter, TestSuite};
use msecheck_sim::SimConfig;

use crate::common::{jittery_sim, runner};

fn assert_all_pass(report: &msecheck_core::SuiteReport) {
    let failures: Vec<String> = report
        .tests
        .iter()
        .filter(|t| !t.outcome.is_pass())
        .map(|t| format!("{}: {}", t.name, t.outcome))
        .collect();
    assert!(failures.is_empty(), "failing cases: {failures:#?}");
}

#[tokio::test(start_paused = true)]
async fn test_builtin_suite_passes_on_instant_sim() {
    let suite = TestSuite::builtin();
    let report = runner(SimConfig::instant(), MsecheckConfig::for_testing())
        .run(&suite, &SuiteFilter::default())
        .await
        .unwrap();

    assert_eq!(report.tests.len(), suite.len());
    assert_all_pass(&report);
}

#[tokio::test(start_paused = true)]
async fn test_builtin_suite_passes_with_latency_jitter() {
    let report = runner(jittery_sim().with_seed(99), MsecheckConfig::for_testing())
        .run(&TestSuite::builtin(), &SuiteFilter::default())
        .await
        .unwrap();

    assert_all_pass(&report);
}

#[tokio::test(start_paused = true)]
async fn test_strict_double_append_passes_on_busy_host() {
    let mut config = MsecheckConfig::for_testing();
    config.append.double_append_policy = DoubleAppendPolicy::Strict;
    let report = runner(jittery_sim(), config)
        .run(&TestSuite::builtin(), &double_append_only())
        .await
        .unwrap();

    assert_eq!(report.tests.len(), 1);
    assert_eq!(report.tests[0].outcome, Outcome::Pass);
}

fn double_append_only() -> SuiteFilter {
    SuiteFilter {
        name: Some("DoubleAppend".to_string()),
        category: None,
    }
}

fn queueing_sim() -> SimConfig {
    SimConfig {
        queue_concurrent_appends: true,
        ..jittery_sim()
    }
}

#[tokio::test(start_paused = true)]
async fn test_tolerant_double_append_accepts_serialized_appends() {
    let report = runner(queueing_sim(), MsecheckConfig::for_testing())
        .run(&TestSuite::builtin(), &double_append_only())
        .await
        .unwrap();

    assert_eq!(report.tests.len(), 1);
    assert_eq!(report.tests[0].outcome, Outcome::Pass);
}

#[tokio::test(start_paused = true)]
async fn test_strict_double_append_fails_when_host_queues() {
    let mut config = MsecheckConfig::for_testing();
    config.append.double_append_policy = DoubleAppendPolicy::Strict;

    let report = runner(queueing_sim(), config)
        .run(&TestSuite::builtin(), &double_append_only())
        .await
        .unwrap();

    match &report.tests[0].outcome {
        Outcome::Fail(reason) => assert!(reason.contains("busy rejection"), "{reason}"),
        other => panic!("expected failure, got {other}"),
    }
    assert_eq!(report.mandatory_failures().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_playback_category_on_realtime_sim() {
    let filter = SuiteFilter {
        name: None,
        category: Some("mse playback".to_string()),
    };
    let report = runner(SimConfig::realistic(), MsecheckConfig::default())
        .run(&TestSuite::builtin(), &filter)
        .await
        .unwrap();

    assert!(!report.tests.is_empty());
    assert!(report.tests.iter().all(|t| t.category == "MSE Playback"));
    assert_all_pass(&report);
}

#[tokio::test(start_paused = true)]
async fn test_case_without_codec_support_is_demoted() {
    let sim = SimConfig {
        supported_codecs: vec!["simv.1".to_string()],
        ..SimConfig::instant()
    };
    let report = runner(sim, MsecheckConfig::for_testing())
        .run(&TestSuite::builtin(), &SuiteFilter::default())
        .await
        .unwrap();

    let av = report.get("DurationReduction").unwrap();
    assert!(av.demoted);
    assert!(!av.mandatory);
    assert!(report.get("AppendUntil").unwrap().outcome.is_pass());
    assert!(report.mandatory_failures().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_catalog_loaded_from_disk_drives_suite() {
    let (catalog, fetcher) = msecheck_sim::standard_catalog();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, catalog.to_json().unwrap()).unwrap();

    let loaded = msecheck_core::StreamCatalog::load(&path).unwrap();
    assert_eq!(loaded.len(), catalog.len());

    let host = std::sync::Arc::new(msecheck_sim::SimHost::new(SimConfig::instant(), fetcher));
    let report = msecheck_core::SuiteRunner::new(
        host,
        std::sync::Arc::new(loaded),
        MsecheckConfig::for_testing(),
    )
    .run(&TestSuite::builtin(), &SuiteFilter::default())
    .await
    .unwrap();

    assert_all_pass(&report);
}
