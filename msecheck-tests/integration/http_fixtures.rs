//! Exported fixtures fetched over real HTTP range requests.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use msecheck_core::{
    Fetcher, HttpFetcher, MsecheckConfig, StreamCatalog, SuiteFilter, SuiteRunner, TestSuite,
};
use msecheck_sim::{SimConfig, SimHost, export_standard_catalog};
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

async fn serve(dir: &Path) -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = Router::new().fallback_service(ServeDir::new(dir));
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (address, server)
}

fn http_config(address: SocketAddr) -> MsecheckConfig {
    let mut config = MsecheckConfig::for_testing();
    config.fetch.media_base_url = Some(format!("http://{address}/"));
    config
}

#[tokio::test]
async fn test_http_fetcher_reads_exported_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = StreamCatalog::load(&export_standard_catalog(dir.path()).unwrap()).unwrap();
    let (address, server) = serve(dir.path()).await;

    let fetcher = HttpFetcher::new(&http_config(address).fetch).unwrap();
    let video = catalog.get("video").unwrap();
    let segment = &video.segments[2];
    let fetched = fetcher
        .fetch_range(&video.url, segment.offset..segment.end_offset())
        .await
        .unwrap();

    assert_eq!(fetched.total_size, video.size);
    assert_eq!(fetched.data.len() as u64, segment.size);
    assert_eq!(&fetched.data[..4], b"SIMS");
    server.abort();
}

#[tokio::test]
async fn test_core_cases_pass_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = StreamCatalog::load(&export_standard_catalog(dir.path()).unwrap()).unwrap();
    let (address, server) = serve(dir.path()).await;

    let config = http_config(address);
    let fetcher = HttpFetcher::new(&config.fetch).unwrap();
    let host = SimHost::with_fetcher(SimConfig::instant(), Arc::new(fetcher));
    let filter = SuiteFilter {
        name: None,
        category: Some("mse core".to_string()),
    };

    let report = SuiteRunner::new(Arc::new(host), Arc::new(catalog), config)
        .run(&TestSuite::builtin(), &filter)
        .await
        .unwrap();
    server.abort();

    let failures: Vec<String> = report
        .tests
        .iter()
        .filter(|t| !t.outcome.is_pass())
        .map(|t| format!("{}: {}", t.name, t.outcome))
        .collect();
    assert!(!report.tests.is_empty());
    assert!(failures.is_empty(), "failing cases: {failures:#?}");
}
