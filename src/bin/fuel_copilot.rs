//! fuel-copilot: CLI entry point for the per-truck fuel estimation pipeline.
//!
//! Grounded on the teacher's `main.rs`: `clap::Parser` CLI args with doc
//! comments as help text, `tracing_subscriber::fmt` initialized from
//! `RUST_LOG` (default `info`), a `CancellationToken` wired to Ctrl-C, and
//! a closing summary log line once the run drains.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use fuel_copilot_core::app::Application;
use fuel_copilot_core::config::{self, Config};
use fuel_copilot_core::telemetry::{
    FileTelemetrySource, SyntheticScenario, SyntheticTelemetrySource, TelemetrySource,
};

#[derive(Parser, Debug)]
#[command(name = "fuel-copilot")]
#[command(about = "Per-truck stateful fuel estimation pipeline")]
#[command(version)]
struct CliArgs {
    /// Path to a telemetry file to replay (.csv or .jsonl, by extension)
    #[arg(long, value_name = "PATH", conflicts_with = "scenario")]
    input: Option<PathBuf>,

    /// Run a built-in synthetic scenario instead of reading --input
    #[arg(long, value_enum, conflicts_with = "input")]
    scenario: Option<ScenarioArg>,

    /// Truck id to assign synthetic readings (ignored for --input, whose
    /// rows each carry their own truck_id)
    #[arg(long, default_value = "demo-truck")]
    truck_id: String,

    /// Telemetry source batch size
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ScenarioArg {
    SaddleTankRefuel,
    SiphoningWhileParked,
    HighwayCruise,
}

impl From<ScenarioArg> for SyntheticScenario {
    fn from(value: ScenarioArg) -> Self {
        match value {
            ScenarioArg::SaddleTankRefuel => SyntheticScenario::SaddleTankRefuel,
            ScenarioArg::SiphoningWhileParked => SyntheticScenario::SiphoningWhileParked,
            ScenarioArg::HighwayCruise => SyntheticScenario::HighwayCruise,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = Config::load().context("failed to load configuration")?;
    config::init(config.clone());

    info!("fuel-copilot starting, worker_pool_size={}", config.worker_pool_size);

    let source: Box<dyn TelemetrySource> = match (args.input, args.scenario) {
        (Some(path), None) => {
            Box::new(FileTelemetrySource::open(&path, args.batch_size).with_context(|| format!("opening {}", path.display()))?)
        }
        (None, Some(scenario)) => Box::new(SyntheticTelemetrySource::new(
            scenario.into(),
            args.truck_id.as_str(),
            args.batch_size,
        )),
        (None, None) => Box::new(SyntheticTelemetrySource::new(
            SyntheticScenario::HighwayCruise,
            args.truck_id.as_str(),
            args.batch_size,
        )),
        (Some(_), Some(_)) => unreachable!("clap enforces --input/--scenario are mutually exclusive"),
    };

    let app = Application::new(&config);

    tokio::select! {
        result = app.run_source(source) => {
            let submitted = result.context("telemetry source failed")?;
            info!(submitted, "telemetry source drained");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
            app.request_shutdown();
        }
    }

    let fleet = app.query().fleet_snapshot();
    let ingest_stats = app.ingest().stats();
    info!(
        trucks = fleet.len(),
        accepted = ingest_stats.accepted,
        dropped_queue_full = ingest_stats.dropped_queue_full,
        dropped_out_of_order = ingest_stats.dropped_out_of_order,
        dropped_rate_limited = ingest_stats.dropped_rate_limited,
        "run summary"
    );

    let deadline = std::time::Duration::from_secs(config.graceful_shutdown_deadline_seconds);
    app.shutdown(deadline).await;

    info!("fuel-copilot shutdown complete");
    Ok(())
}
