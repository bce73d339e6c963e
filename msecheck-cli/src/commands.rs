//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Subcommand;
use msecheck_core::{
    DoubleAppendPolicy, Host, HttpFetcher, MsecheckConfig, Outcome, StreamCatalog, SuiteFilter,
    SuiteReport, SuiteRunner, TestSuite,
};
use msecheck_sim::{SimConfig, SimHost, export_standard_catalog, standard_catalog};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List registered test cases
    List {
        /// Only cases in this category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Show the stream fixtures available to the suite
    Streams,
    /// Write the fixture streams and their catalog to a directory
    ExportFixtures {
        /// Target directory, created if missing
        dir: PathBuf,
    },
    /// Run the suite against the simulated host
    Run {
        /// Case-insensitive substring of test names to run
        #[arg(short, long)]
        filter: Option<String>,
        /// Only run cases in this category
        #[arg(short, long)]
        category: Option<String>,
        /// Per-test budget in seconds, overriding the configured default
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Print the report as JSON instead of a summary
        #[arg(long)]
        json: bool,
        /// Require a busy error when appending while updating
        #[arg(long)]
        strict_double_append: bool,
        /// JSON file with simulator settings
        #[arg(long, conflicts_with = "realistic")]
        sim_config: Option<PathBuf>,
        /// Use real-time latencies instead of the instant preset
        #[arg(long)]
        realistic: bool,
        /// Seed for simulated latency jitter
        #[arg(long)]
        seed: Option<u64>,
        /// Stream catalog JSON whose media is fetched over HTTP
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Base URL relative catalog URLs resolve against
        #[arg(long, requires = "catalog")]
        media_base_url: Option<String>,
    },
}

/// Options for a suite run.
pub struct RunOptions {
    pub filter: SuiteFilter,
    pub timeout: Option<u64>,
    pub json: bool,
    pub strict_double_append: bool,
    pub sim_config: Option<PathBuf>,
    pub realistic: bool,
    pub seed: Option<u64>,
    pub catalog: Option<PathBuf>,
    pub media_base_url: Option<String>,
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List { category } => {
            list_cases(category);
            Ok(())
        }
        Commands::Streams => {
            show_streams();
            Ok(())
        }
        Commands::ExportFixtures { dir } => export_fixtures(&dir),
        Commands::Run {
            filter,
            category,
            timeout,
            json,
            strict_double_append,
            sim_config,
            realistic,
            seed,
            catalog,
            media_base_url,
        } => {
            run_suite(RunOptions {
                filter: SuiteFilter {
                    name: filter,
                    category,
                },
                timeout,
                json,
                strict_double_append,
                sim_config,
                realistic,
                seed,
                catalog,
                media_base_url,
            })
            .await
        }
    }
}

/// Print registered cases grouped by category.
pub fn list_cases(category: Option<String>) {
    let suite = TestSuite::builtin();
    let filter = SuiteFilter {
        name: None,
        category,
    };

    for category in suite.categories() {
        let cases: Vec<_> = suite
            .filter(&filter)
            .into_iter()
            .filter(|c| c.category == category)
            .collect();
        if cases.is_empty() {
            continue;
        }

        println!("{category}:");
        for case in cases {
            let flag = if case.mandatory { "" } else { " (optional)" };
            println!("  {:<24} {}{flag}", case.name, case.title);
        }
    }
}

/// Print the fixture catalog the simulated host serves.
pub fn show_streams() {
    let (catalog, _) = standard_catalog();
    print_catalog(&catalog);
}

/// Write the fixture catalog to `dir` so it can be served over HTTP.
///
/// # Errors
/// - The directory or a fixture file could not be written
pub fn export_fixtures(dir: &Path) -> anyhow::Result<()> {
    let path = export_standard_catalog(dir)
        .with_context(|| format!("exporting fixtures to {}", dir.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn print_catalog(catalog: &StreamCatalog) {
    for role in catalog.roles() {
        let Some(stream) = catalog.get(role) else {
            continue;
        };
        println!(
            "{role:<18} {:<32} {:>6.1}s {:>3} segments {:>8} bytes",
            stream.type_string(),
            stream.duration,
            stream.segment_count(),
            stream.size
        );
    }
}

/// Run the suite and print the report.
///
/// # Errors
/// - Simulator configuration or the stream catalog could not be loaded
/// - The host cannot run the suite at all
/// - A mandatory case did not pass
pub async fn run_suite(options: RunOptions) -> anyhow::Result<()> {
    let mut sim_config = match (&options.sim_config, options.realistic) {
        (Some(path), _) => SimConfig::load(path)
            .with_context(|| format!("loading sim config {}", path.display()))?,
        (None, true) => SimConfig::realistic(),
        (None, false) => SimConfig::instant(),
    };
    if let Some(seed) = options.seed {
        sim_config = sim_config.with_seed(seed);
    }

    let mut config = MsecheckConfig::from_env();
    if let Some(secs) = options.timeout {
        config.timeouts.default_test_timeout = Duration::from_secs(secs);
    }
    if options.strict_double_append {
        config.append.double_append_policy = DoubleAppendPolicy::Strict;
    }

    if let Some(base_url) = options.media_base_url {
        config.fetch.media_base_url = Some(base_url);
    }

    let (catalog, host) = match &options.catalog {
        Some(path) => {
            let catalog = StreamCatalog::load(path)
                .with_context(|| format!("loading stream catalog {}", path.display()))?;
            let fetcher = HttpFetcher::new(&config.fetch).context("building HTTP fetcher")?;
            tracing::info!(
                catalog = %path.display(),
                base_url = config.fetch.media_base_url.as_deref().unwrap_or("-"),
                "Fetching stream media over HTTP"
            );
            (catalog, SimHost::with_fetcher(sim_config, Arc::new(fetcher)))
        }
        None => {
            let (catalog, fetcher) = standard_catalog();
            (catalog, SimHost::new(sim_config, fetcher))
        }
    };
    tracing::debug!(host = host.name(), streams = catalog.len(), "Host ready");
    let runner = SuiteRunner::new(Arc::new(host), Arc::new(catalog), config);

    let report = runner.run(&TestSuite::builtin(), &options.filter).await?;

    if options.json {
        println!("{}", report.to_json()?);
    } else {
        print_summary(&report);
    }

    let failures = report.mandatory_failures();
    if !failures.is_empty() {
        bail!("{} mandatory case(s) did not pass", failures.len());
    }
    Ok(())
}

fn print_summary(report: &SuiteReport) {
    println!("Host: {}", report.host);
    for test in &report.tests {
        let note = if test.demoted {
            " [demoted]"
        } else if !test.mandatory {
            " [optional]"
        } else {
            ""
        };
        println!(
            "  {:<8} {:<24} {:>6}ms{note}  {}",
            test.outcome.as_str().to_uppercase(),
            test.name,
            test.duration_ms,
            reason(&test.outcome)
        );
    }
    println!(
        "{} passed, {} failed, {} timed out",
        report.passed(),
        report.failed(),
        report.timed_out()
    );
}

fn reason(outcome: &Outcome) -> &str {
    match outcome {
        Outcome::Pass => "",
        Outcome::Fail(reason) | Outcome::Timeout(reason) => reason,
    }
}
