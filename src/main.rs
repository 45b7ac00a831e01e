//! Edifice - Entry Point
//!
//! Loads a run configuration from JSON, spawns the simulation loop, and
//! prints a per-tick summary of telemetry, state changes and alarms until
//! the run covers its configured duration or the process is interrupted.

use std::path::PathBuf;

use clap::Parser;

use edifice::alarm::AlarmTransition;
use edifice::config::RunConfig;
use edifice::core::error::Result;
use edifice::engine::runner::spawn_run;

#[derive(Parser, Debug)]
#[command(name = "edifice", about = "IoT building simulation engine")]
struct Args {
    /// Path to the run configuration JSON
    config: PathBuf,

    /// Override the configured time scale (simulated seconds per real second)
    #[arg(long)]
    time_scale: Option<f64>,

    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,

    /// Print every telemetry point instead of per-tick summaries
    #[arg(long)]
    verbose_telemetry: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edifice=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = RunConfig::from_path(&args.config)?;
    if let Some(scale) = args.time_scale {
        config.time_scale = scale;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;

    let (handle, mut output) = spawn_run(&config)?;
    tracing::info!(run = %handle.id().0, "simulation started");

    while let Some(batch) = output.recv().await {
        if args.verbose_telemetry {
            for point in &batch.telemetry {
                println!(
                    "{} {} {} = {}",
                    batch.sim_time,
                    point.device_id,
                    point.key,
                    serde_json::to_string(&point.value)?
                );
            }
        } else {
            println!(
                "tick {:>6} [{}] telemetry: {:>4}  changes: {:>2}  alarms: {}",
                batch.tick,
                batch.sim_time,
                batch.telemetry.len(),
                batch.state_changes.len(),
                batch.alarm_transitions.len(),
            );
        }
        for transition in &batch.alarm_transitions {
            match transition {
                AlarmTransition::Raised { alarm } => {
                    println!("  ALARM RAISED  [{:?}] {}", alarm.severity, alarm.message);
                }
                AlarmTransition::Cleared { alarm } => {
                    println!("  alarm cleared {}", alarm.message);
                }
            }
        }
    }

    tracing::info!("simulation finished");
    Ok(())
}
