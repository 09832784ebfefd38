//! Command modules for Relay CLI

pub mod output;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::agents::PLANNING_STATUS;
use crate::config::RelayConfig;
use crate::coordination::{build_system, Coordinator, SessionProgress};
use output::OutputFormat;

/// Options of `relay run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub goal: String,
    pub config: Option<PathBuf>,

    /// How long to wait for the workflow before reporting
    pub wait: Duration,

    /// Log entries to include in the report
    pub history: usize,
}

/// What `relay run --format json` prints
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub session_id: String,
    pub completed: bool,
    pub progress: SessionProgress,
    pub history: Vec<Value>,
}

/// Run one goal through the configured agents and report the outcome
pub async fn run_goal(options: RunOptions, format: OutputFormat) -> Result<()> {
    let config = RelayConfig::load_or_default(options.config.as_deref())?;
    let (system, coordinator) = build_system(&config).await;
    info!(agents = system.len(), "Agent system started");

    let session_id = coordinator.set_goal(options.goal.clone(), None).await;
    coordinator
        .start_optimization(&session_id)
        .await
        .context("Failed to start workflow")?;

    let spinner = (format == OutputFormat::Human).then(|| output::spinner(format!("Running goal: {}", options.goal)));
    let completed = wait_for_completion(&coordinator, &session_id, options.wait).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let progress = coordinator.progress(&session_id).await;
    let history = coordinator.router().history(options.history).await;
    system.shutdown().await;

    match format {
        OutputFormat::Json => {
            output::print_json(&RunReport {
                session_id,
                completed,
                progress,
                history: history.iter().map(|m| m.to_wire()).collect(),
            });
        }
        OutputFormat::Human => {
            if completed {
                output::success("Workflow completed");
            } else {
                output::warn(format!("Workflow still in progress after {:?}", options.wait));
            }
            output::print_progress(&progress);
            if let SessionProgress::Active { system_stats, .. } = &progress {
                output::print_stats_table(system_stats);
            }
            println!();
            output::print_history_table(&history);
        }
    }

    Ok(())
}

/// Poll the blackboard until the decomposer reports completion or `wait` elapses
async fn wait_for_completion(coordinator: &Coordinator, session_id: &str, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;

    loop {
        let done = coordinator
            .session(session_id)
            .await
            .and_then(|s| s.get(PLANNING_STATUS))
            .is_some_and(|status| status == "completed");
        if done {
            return true;
        }
        if Instant::now() >= deadline {
            warn!(session_id = %session_id, "Timed out waiting for workflow");
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Print the effective configuration
pub fn show_config(path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let config = RelayConfig::load_or_default(path.as_deref())?;

    match format {
        OutputFormat::Json => output::print_json(&config),
        OutputFormat::Human => print!("{}", config.to_toml()?),
    }
    Ok(())
}

/// Write the default configuration to `path`
pub fn init_config(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    RelayConfig::default().save_to_path(&path)?;
    output::success(format!("Wrote default configuration to {}", path.display()));
    Ok(())
}
