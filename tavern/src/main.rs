//! Tavern simulation.
//!
//! Runs the seating engine with its cashier, manager and a stream of
//! parties until the fire alarm, then prints what happened.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tavern::{Config, Simulation, SimulationError};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(log_file: Option<&Path>) -> Result<(), SimulationError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tavern=debug".into());

    let (stdout, file) = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (None, Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))))
        },
        None => (Some(fmt::layer()), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();
    Ok(())
}

async fn run(config: Config) -> Result<(), SimulationError> {
    let simulation = Simulation::new(config)?;

    let alarm = simulation.alarm();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && alarm.raise() {
            info!("Received Ctrl+C, raising the fire alarm");
        }
    });

    let report = simulation.run().await?;
    info!("Simulation finished\n{report}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    if let Err(error) = init_tracing(config.run.log_file.as_deref()) {
        eprintln!("cannot open log file: {error}");
        return ExitCode::FAILURE;
    }
    info!(?config, "Configuration loaded");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "Simulation failed");
            ExitCode::FAILURE
        },
    }
}
