//! Scripted workflow driver.
//!
//! Loads a definition document and a completion script named by the
//! environment, drives one instance through the script and prints the final
//! instance snapshot as JSON on stdout. Exits non-zero on any failure.

mod config;
mod error;
mod script;

use config::RunnerConfig;
use error::RunnerError;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypoint_core::Result;
use waypoint_workflow::ActivityRegistry;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,waypoint_workflow=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::error!("{report}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), RunnerError> {
    let config = RunnerConfig::from_env().map_err(|e| RunnerError::Config {
        details: e.to_string(),
    })?;
    tracing::info!(
        definition = %config.definition_path.display(),
        script = %config.script_path.display(),
        "Loaded configuration"
    );

    let registry = ActivityRegistry::with_builtins();
    let definition = Arc::new(script::load_definition(&config.definition_path, &registry)?);
    let steps = script::load_script(&config.script_path)?;

    let mut instance = definition
        .create_instance_with(config.engine.clone())
        .map_err(|e| RunnerError::Definition {
            details: e.to_string(),
        })?;
    tracing::info!(instance = %instance.id(), steps = steps.len(), "Starting run");

    let logger = tokio::spawn(script::log_changes(instance.subscribe()));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            interrupt.cancel();
        }
    });

    let outcome = script::run(&mut instance, &steps, &cancel).await;
    let snapshot = instance.snapshot();
    drop(instance);
    if let Err(e) = logger.await {
        tracing::warn!(error = %e, "Change logger ended abnormally");
    }
    outcome?;

    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| RunnerError::Output {
        details: e.to_string(),
    })?;
    println!("{json}");
    Ok(())
}
