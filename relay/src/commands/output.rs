//! Output formatting utilities for CLI

use crate::agents::{AgentStats, AgentStatus};
use crate::coordination::{AgentMessage, MessageKind, SessionProgress, SystemStats};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "::");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "::");
pub static CHECK: Emoji<'_, '_> = Emoji("✓ ", "OK ");
pub static CROSS: Emoji<'_, '_> = Emoji("✗ ", "ERR");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ ", "i ");

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Create a spinner with message
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print success message
pub fn success(msg: impl Into<String>) {
    println!("{} {}", style(CHECK).green(), style(msg.into()).green());
}

/// Print error message
pub fn error(msg: impl Into<String>) {
    eprintln!("{} {}", style(CROSS).red(), style(msg.into()).red());
}

/// Print info message
pub fn info(msg: impl Into<String>) {
    println!("{} {}", style(INFO).cyan(), msg.into());
}

/// Print warning message
pub fn warn(msg: impl Into<String>) {
    println!("{} {}", style("⚠").yellow(), style(msg.into()).yellow());
}

/// Print pretty JSON, falling back to the compact form
pub fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => error(format!("Failed to serialize output: {e}")),
    }
}

/// Print a session's goal and blackboard
pub fn print_progress(progress: &SessionProgress) {
    match progress {
        SessionProgress::Unknown { error: reason } => error(reason.clone()),
        SessionProgress::Active { session_id, goal, data, .. } => {
            println!("\n{} Session\n", ROCKET);
            println!("  ID:       {}", session_id);
            println!("  Goal:     {}", goal);

            if data.is_empty() {
                println!("  Data:     (empty)");
            } else {
                println!("\n  Blackboard:");
                let mut keys: Vec<_> = data.keys().collect();
                keys.sort();
                for key in keys {
                    println!("    {:<22} {}", key, summarize(&data[key.as_str()], 60));
                }
            }
            println!();
        }
    }
}

/// Print agent statistics table
pub fn print_stats_table(stats: &SystemStats) {
    println!("\n{} System Statistics\n", SPARKLE);
    println!("  Agents:     {}", stats.total_agents);
    println!("  Messages:   {}", stats.total_messages);
    println!();

    if stats.agents.is_empty() {
        info("No agents registered");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Agent", "Status", "Completed", "Failed", "Avg Time", "Success Rate"]);

    for agent in &stats.agents {
        table.add_row(stats_row(agent));
    }

    println!("{table}");
}

fn stats_row(agent: &AgentStats) -> Vec<Cell> {
    let rate = Cell::new(format!("{:.1}%", agent.success_rate * 100.0));
    let rate = if agent.success_rate < 1.0 { rate.fg(Color::Yellow) } else { rate };

    vec![
        Cell::new(agent.agent_id.as_str()),
        Cell::new(format_status(agent.status)),
        Cell::new(agent.tasks_completed.to_string()),
        Cell::new(agent.tasks_failed.to_string()),
        Cell::new(format_duration(Duration::from_secs_f64(agent.avg_time_per_task.max(0.0)))),
        rate,
    ]
}

/// Print message log table
pub fn print_history_table(history: &[AgentMessage]) {
    if history.is_empty() {
        info("No messages routed");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Time", "Type", "From", "To", "Payload"]);

    for message in history {
        table.add_row(vec![
            Cell::new(message.timestamp.format("%H:%M:%S%.3f").to_string()),
            Cell::new(message.kind.to_string()).fg(kind_color(message.kind)),
            Cell::new(message.from.as_str()),
            Cell::new(message.to.to_string()),
            Cell::new(summarize(&message.payload, 48)),
        ]);
    }

    println!("{table}");
}

fn kind_color(kind: MessageKind) -> Color {
    match kind {
        MessageKind::Request => Color::Cyan,
        MessageKind::Response => Color::Green,
        MessageKind::Event => Color::Magenta,
        MessageKind::Command => Color::Yellow,
    }
}

fn format_status(status: AgentStatus) -> String {
    match status {
        AgentStatus::Idle => style("Idle").cyan().to_string(),
        AgentStatus::Working => style("Working").green().to_string(),
        AgentStatus::Waiting => style("Waiting").yellow().to_string(),
        AgentStatus::Error => style("Error").red().to_string(),
        AgentStatus::Completed => style("Completed").dim().to_string(),
    }
}

fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros < 1_000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1_000.0)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Compact single-line rendering of a JSON value, cut to `max` characters
fn summarize(value: &Value, max: usize) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if text.chars().count() <= max {
        text
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
