//! msecheck CLI - Command-line interface
//!
//! Lists and runs the conformance suite against the simulated host.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use msecheck_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "msecheck")]
#[command(about = "Conformance checks for segmented media buffering")]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    commands::handle_command(cli.command).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "msecheck",
            "--log-level",
            "debug",
            "run",
            "--filter",
            "merge",
            "--timeout",
            "5",
            "--strict-double-append",
        ])
        .unwrap();

        assert_eq!(cli.log_level, CliLogLevel::Debug);
        match cli.command {
            commands::Commands::Run {
                filter,
                timeout,
                strict_double_append,
                json,
                ..
            } => {
                assert_eq!(filter.as_deref(), Some("merge"));
                assert_eq!(timeout, Some(5));
                assert!(strict_double_append);
                assert!(!json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_sim_config_conflicts_with_realistic() {
        let parsed = Cli::try_parse_from([
            "msecheck",
            "run",
            "--sim-config",
            "sim.json",
            "--realistic",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_media_base_url_requires_catalog() {
        let parsed = Cli::try_parse_from([
            "msecheck",
            "run",
            "--media-base-url",
            "http://localhost:8000/",
        ]);
        assert!(parsed.is_err());

        let cli = Cli::try_parse_from([
            "msecheck",
            "run",
            "--catalog",
            "fixtures/catalog.json",
            "--media-base-url",
            "http://localhost:8000/",
        ])
        .unwrap();
        match cli.command {
            commands::Commands::Run {
                catalog,
                media_base_url,
                ..
            } => {
                assert_eq!(catalog, Some(PathBuf::from("fixtures/catalog.json")));
                assert_eq!(media_base_url.as_deref(), Some("http://localhost:8000/"));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_export_fixtures_writes_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fixtures").to_string_lossy().to_string();
        let cli = Cli::try_parse_from(["msecheck", "export-fixtures", target.as_str()]).unwrap();

        let commands::Commands::ExportFixtures { dir: target } = cli.command else {
            panic!("expected export-fixtures command");
        };
        commands::export_fixtures(&target).unwrap();

        let catalog =
            msecheck_core::StreamCatalog::load(&target.join("catalog.json")).unwrap();
        assert!(catalog.get("video").is_some());
        assert!(target.join("video.simv").exists());
    }
}
