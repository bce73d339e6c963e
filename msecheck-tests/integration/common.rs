//! Shared harness for driving a simulated playback context directly.

use std::sync::Arc;
use std::time::Duration;

use msecheck_core::{
    Host, MsecheckConfig, PlaybackContext, RangeSource, SourceBuffer, StreamCatalog, SuiteRunner,
    TestContext,
};
use msecheck_sim::{InMemoryFetcher, SimConfig, SimHost, standard_catalog};

/// One open playback context plus everything needed to feed it.
pub struct Harness {
    pub ctx: TestContext,
    pub playback: PlaybackContext,
    pub catalog: StreamCatalog,
    pub fetcher: InMemoryFetcher,
}

pub async fn harness(name: &str) -> Harness {
    harness_with(name, MsecheckConfig::for_testing(), SimConfig::instant()).await
}

pub async fn harness_with(name: &str, config: MsecheckConfig, sim: SimConfig) -> Harness {
    let (catalog, fetcher) = standard_catalog();
    let host = SimHost::new(sim, fetcher.clone());
    let playback = host.open().await.expect("sim host opens a playback context");

    Harness {
        ctx: TestContext::new(name, Arc::new(config)),
        playback,
        catalog,
        fetcher,
    }
}

impl Harness {
    pub fn source(&self, role: &str) -> RangeSource {
        let descriptor = self.catalog.get(role).expect("role in standard catalog");
        RangeSource::new(
            descriptor,
            Arc::new(self.fetcher.clone()),
            self.ctx.config().append.default_pull_size,
        )
    }

    pub fn add_buffer(&self, role: &str) -> Arc<dyn SourceBuffer> {
        let descriptor = self.catalog.get(role).expect("role in standard catalog");
        self.playback
            .media_source
            .add_source_buffer(&descriptor.type_string())
            .expect("sim accepts catalog types")
    }
}

/// Simulator whose operations complete after uneven, seeded delays.
pub fn jittery_sim() -> SimConfig {
    SimConfig {
        append_latency: Duration::from_millis(5),
        remove_latency: Duration::from_millis(20),
        latency_jitter: Duration::from_millis(40),
        ..SimConfig::instant()
    }
}

pub fn runner(sim: SimConfig, config: MsecheckConfig) -> SuiteRunner {
    let (catalog, fetcher) = standard_catalog();
    let host = Arc::new(SimHost::new(sim, fetcher));
    SuiteRunner::new(host, Arc::new(catalog), config)
}
