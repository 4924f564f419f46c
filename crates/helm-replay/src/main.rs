//! helm-replay: run a strategy scenario through the execution core.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Replay a price scenario through the helm execution engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenario file path (can also be set via HELM_SCENARIO env var)
    #[arg(short, long)]
    scenario: Option<String>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Print Prometheus metrics after the report
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    helm_telemetry::init_logging()?;

    info!("Starting helm-replay v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > HELM_SCENARIO env var > default
    let scenario_path = args
        .scenario
        .or_else(|| std::env::var("HELM_SCENARIO").ok())
        .unwrap_or_else(|| "crates/helm-replay/scenarios/bracket.toml".to_string());

    info!(scenario_path = %scenario_path, "Loading scenario");
    let config = helm_replay::ReplayConfig::from_file(&scenario_path)?;

    let report = helm_replay::run_scenario(&config)?;
    let json = report.to_json()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(path = %path, "Report written");
        }
        None => println!("{json}"),
    }

    if args.metrics {
        println!("{}", helm_telemetry::Metrics::gather_text()?);
    }

    Ok(())
}
