//! Integration tests for msecheck
//!
//! These tests run the drivers, the runner and the builtin suite end to end
//! against the simulated host.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/append_drivers.rs"]
mod append_drivers;
#[path = "integration/builtin_suite.rs"]
mod builtin_suite;
#[path = "integration/http_fixtures.rs"]
mod http_fixtures;
#[path = "integration/playback_drivers.rs"]
mod playback_drivers;
#[path = "integration/runner_outcomes.rs"]
mod runner_outcomes;
#[path = "integration/source_restart.rs"]
mod source_restart;
