// CLI module - foreground supervisor entry point

mod output;
mod signals;

use crate::config::AppConfig;
use crate::process::{Supervisor, SupervisorEvent};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

/// Vigil - supervise a single process with restart, memory and log policies
#[derive(Parser)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise the configured process in the foreground
    Run {
        /// Path to the app config (.json or .toml)
        config: PathBuf,
    },

    /// Validate a config file and print the resolved settings
    Check {
        /// Path to the app config (.json or .toml)
        config: PathBuf,
    },
}

impl Cli {
    /// Parse arguments and execute, returning the process exit code
    pub async fn run() -> anyhow::Result<i32> {
        let cli = Cli::parse();
        cli.execute().await
    }

    async fn execute(&self) -> anyhow::Result<i32> {
        match &self.command {
            Commands::Run { config } => run_supervisor(config).await,
            Commands::Check { config } => check_config(config),
        }
    }
}

fn load(path: &Path) -> anyhow::Result<AppConfig> {
    AppConfig::from_file(path).with_context(|| format!("Invalid config {}", path.display()))
}

fn check_config(path: &Path) -> anyhow::Result<i32> {
    let config = load(path)?;
    let settings = config.to_settings()?;

    output::print_settings(&settings);
    output::print_success_msg(&format!("{} is valid", path.display()));
    Ok(0)
}

async fn run_supervisor(path: &Path) -> anyhow::Result<i32> {
    let config = load(path)?;
    let settings = config.to_settings()?;
    let name = settings.spec.name.clone();

    let supervisor = Supervisor::new(settings);
    let handle = supervisor.handle();

    let signal_task =
        signals::forward_signals(handle.clone()).context("Failed to install signal handlers")?;
    let event_task = tokio::spawn(trace_events(name.clone(), handle.subscribe()));

    output::print_info(&format!("Supervising {} (pid {})", name, std::process::id()));

    let result = supervisor.run().await;

    signal_task.abort();
    event_task.abort();

    match result {
        Ok(outcome) => {
            output::print_outcome(&name, &outcome);
            Ok(outcome.exit_code())
        }
        Err(e) => {
            output::print_error(&e.to_string());
            Ok(1)
        }
    }
}

/// Mirror lifecycle events into the debug log
async fn trace_events(name: String, mut events: broadcast::Receiver<SupervisorEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::debug!(process = %name, ?event, "supervisor event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(process = %name, skipped, "supervisor events lagged")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
