use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedwarden::config::Config;
use feedwarden::coordinator::CollectionCoordinator;
use feedwarden::metrics;
use feedwarden::models::CollectionResult;

#[derive(Parser)]
#[command(
    name = "feedwarden",
    version,
    about = "Threat-intelligence IP feed collector",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (pretty, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run collection once and print the results
    Collect {
        #[command(flatten)]
        pass: PassArgs,

        /// Print Prometheus metrics after the run
        #[arg(long = "metrics", default_value = "false")]
        print_metrics: bool,
    },

    /// Run collection once and print the detailed status report
    Status(PassArgs),

    /// Run collection once and print the performance report
    Report(PassArgs),

    /// Run collection once and print the alerts it raised
    Alerts(PassArgs),
}

/// Selects which feeds a collection pass runs
#[derive(Args, Debug, Default)]
struct PassArgs {
    /// Only run the named feed
    #[arg(short, long)]
    source: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let coordinator = CollectionCoordinator::new(&config.settings_path);
    let base = coordinator.settings().await.default_collector_config();
    for collector in config
        .build_collectors(&base)
        .context("Failed to build collectors")?
    {
        coordinator.register_collector(collector).await;
    }

    tracing::info!(feeds = config.feeds.len(), "feedwarden starting");

    let output = execute(&coordinator, cli.command).await?;
    println!("{output}");

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("feedwarden=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("feedwarden={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Run the command against a populated coordinator and render its output
async fn execute(coordinator: &CollectionCoordinator, command: Commands) -> Result<String> {
    match command {
        Commands::Collect {
            pass,
            print_metrics,
        } => {
            let results = run_pass(coordinator, pass.source).await;
            let summaries: BTreeMap<&String, serde_json::Value> = results
                .iter()
                .map(|(name, result)| (name, result.to_summary()))
                .collect();
            let mut output = serde_json::to_string_pretty(&summaries)?;
            if print_metrics {
                let text = metrics::gather_metrics()
                    .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;
                output.push('\n');
                output.push_str(&text);
            }
            Ok(output)
        }
        Commands::Status(pass) => {
            run_pass(coordinator, pass.source).await;
            let status = coordinator.get_detailed_status().await;
            Ok(serde_json::to_string_pretty(&status)?)
        }
        Commands::Report(pass) => {
            run_pass(coordinator, pass.source).await;
            let report = coordinator.get_performance_report().await;
            Ok(serde_json::to_string_pretty(&report)?)
        }
        Commands::Alerts(pass) => {
            run_pass(coordinator, pass.source).await;
            let lines: Vec<String> = coordinator
                .get_alerts()
                .await
                .iter()
                .map(|alert| alert.format_message())
                .collect();
            Ok(lines.join("\n"))
        }
    }
}

/// One collection pass; Ctrl-C cancels whatever is still in flight
async fn run_pass(
    coordinator: &CollectionCoordinator,
    source: Option<String>,
) -> BTreeMap<String, CollectionResult> {
    let run = async {
        match &source {
            Some(name) => {
                let result = coordinator.collect_single(name).await;
                BTreeMap::from([(result.source_name.clone(), result)])
            }
            None => coordinator
                .collect_all()
                .await
                .into_iter()
                .collect::<BTreeMap<String, CollectionResult>>(),
        }
    };
    tokio::pin!(run);

    tokio::select! {
        results = &mut run => results,
        _ = tokio::signal::ctrl_c() => {
            let cancelled = coordinator.cancel_all_collections().await;
            tracing::warn!(cancelled = cancelled, "Interrupted, cancelling collections");
            run.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedwarden::collector::Collector;
    use feedwarden::models::CollectorConfig;
    use feedwarden::sources::BlocklistSource;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(server: &MockServer) -> (TempDir, CollectionCoordinator) {
        Mock::given(method("GET"))
            .and(path("/drop.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("192.0.2.1\n192.0.2.0/24\n"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;

        let config = CollectorConfig {
            max_retries: 0,
            timeout_secs: 5.0,
            ..CollectorConfig::default()
        };
        let dir = TempDir::new().unwrap();
        let coordinator = CollectionCoordinator::new(dir.path().join("settings.json"));
        for (name, route) in [("drop", "/drop.txt"), ("gone", "/gone.txt")] {
            let source =
                BlocklistSource::new(format!("{}{route}", server.uri()), Duration::from_secs(5))
                    .unwrap();
            coordinator
                .register_collector(Collector::new(name, Box::new(source), config.clone()))
                .await;
        }
        (dir, coordinator)
    }

    #[test]
    fn test_cli_parses_source_on_report_commands() {
        let cli = Cli::try_parse_from(["feedwarden", "report", "--source", "drop"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Report(PassArgs { source: Some(ref name) }) if name == "drop"
        ));
    }

    #[tokio::test]
    async fn test_report_reflects_the_pass() {
        let server = MockServer::start().await;
        let (_dir, coordinator) = setup(&server).await;

        let output = execute(&coordinator, Commands::Report(PassArgs::default()))
            .await
            .unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(report["stats"]["total_runs"], 2);
        assert_eq!(report["stats"]["successful_runs"], 1);
        assert_eq!(report["per_collector"]["drop"]["total_items"], 2);
    }

    #[tokio::test]
    async fn test_alerts_lists_failures_from_the_pass() {
        let server = MockServer::start().await;
        let (_dir, coordinator) = setup(&server).await;

        let output = execute(&coordinator, Commands::Alerts(PassArgs::default()))
            .await
            .unwrap();

        assert!(output.contains("[ERROR]"), "{output}");
        assert!(output.contains("(gone)"), "{output}");
        assert!(!output.contains("(drop)"), "{output}");
    }

    #[tokio::test]
    async fn test_status_limited_to_one_source() {
        let server = MockServer::start().await;
        let (_dir, coordinator) = setup(&server).await;

        let output = execute(
            &coordinator,
            Commands::Status(PassArgs {
                source: Some("drop".to_string()),
            }),
        )
        .await
        .unwrap();
        let status: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(status["recent_activity"].as_array().unwrap().len(), 1);
        assert_eq!(status["collectors"]["drop"]["total_executions"], 1);
        assert_eq!(status["collectors"]["gone"]["total_executions"], 0);
    }
}
