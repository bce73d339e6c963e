//! msecheck sim - deterministic in-process host for the conformance suite
//!
//! Implements the host seams of `msecheck-core` without a browser: source
//! buffers parse a small synthetic box format, operations complete after a
//! seeded latency, and a clocked element plays through whatever is buffered.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use msecheck_core::{MsecheckConfig, SuiteFilter, SuiteRunner, TestSuite};
//! use msecheck_sim::{SimConfig, SimHost, standard_catalog};
//!
//! # async fn run() -> msecheck_core::Result<()> {
//! let (catalog, fetcher) = standard_catalog();
//! let host = Arc::new(SimHost::new(SimConfig::instant(), fetcher));
//! let runner = SuiteRunner::new(host, Arc::new(catalog), MsecheckConfig::default());
//!
//! let report = runner.run(&TestSuite::builtin(), &SuiteFilter::default()).await?;
//! println!("{} passed, {} failed", report.passed(), report.failed());
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod container;
pub mod element;
pub mod fetcher;
pub mod fixtures;
pub mod host;
pub mod media_source;
pub mod rng;

pub use buffer::SimSourceBuffer;
pub use config::{SimConfig, SimConfigError};
pub use element::SimMediaElement;
pub use fetcher::InMemoryFetcher;
pub use fixtures::{FixtureError, SyntheticStream, export_standard_catalog, standard_catalog};
pub use host::SimHost;
pub use media_source::SimMediaSource;
pub use rng::DeterministicRng;
