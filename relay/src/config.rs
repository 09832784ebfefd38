//! Configuration management for Relay
//!
//! A `relay.toml` file describes the router, the coordinator, the fan-out
//! plan and the reference workers that stand in for domain agents. Every
//! field has a default, so a partial file (or none at all) is valid.

use anyhow::{Context, Result};
use crate::agents::AgentId;
use crate::coordination::{CoordinatorConfig, FanOutPlan, RouterConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Complete Relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub router: RouterConfig,
    pub coordinator: CoordinatorConfig,
    pub planner: PlannerConfig,
    pub plan: FanOutPlan,
    pub workers: WorkersConfig,
}

/// Decomposer settings beyond its id, which lives in [`CoordinatorConfig`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub capabilities: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            capabilities: strings(&["goal_decomposition", "task_assignment", "workflow_management"]),
        }
    }
}

/// Reference workers started by `relay run`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub responders: Vec<ResponderConfig>,
    pub stage: StageConfig,
    pub recorder: RecorderConfig,
}

/// A [`StaticResponder`](crate::agents::StaticResponder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderConfig {
    pub id: AgentId,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub action: String,
    #[serde(default)]
    pub response: Value,
}

/// The [`StageWorker`](crate::agents::StageWorker) behind the plan's next stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub id: AgentId,
    pub capabilities: Vec<String>,
    pub action: String,
    pub event: String,
    pub result: Value,
}

/// The [`EventRecorder`](crate::agents::EventRecorder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub id: AgentId,
    pub capabilities: Vec<String>,

    /// Events to record; empty records all
    pub events: Vec<String>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            responders: vec![
                ResponderConfig {
                    id: AgentId::from("weather"),
                    capabilities: strings(&["weather_forecast", "turbulence_prediction", "wind_analysis"]),
                    action: "get_forecast".to_string(),
                    response: json!({
                        "origin_weather": { "airport": "PTY", "temperature": 28, "wind_speed": 12 },
                        "destination_weather": { "airport": "BOG", "temperature": 22, "wind_speed": 8 },
                        "route_weather": {
                            "turbulence_alerts": [],
                            "recommended_altitude": 39000,
                            "confidence": 0.85
                        }
                    }),
                },
                ResponderConfig {
                    id: AgentId::from("fuel"),
                    capabilities: strings(&["fuel_pricing", "tankering_analysis", "cost_optimization"]),
                    action: "get_fuel_analysis".to_string(),
                    response: json!({
                        "origin_price": 3.45,
                        "destination_price": 4.10,
                        "fuel_burn_estimate": 2400,
                        "tankering_recommended": true,
                        "tankering_savings": 450,
                        "confidence": 0.92
                    }),
                },
                ResponderConfig {
                    id: AgentId::from("network"),
                    capabilities: strings(&["slot_management", "connection_optimization", "network_analysis"]),
                    action: "check_constraints".to_string(),
                    response: json!({
                        "slots_available": true,
                        "connecting_flights": 3,
                        "network_impact": "minimal",
                        "constraints": []
                    }),
                },
            ],
            stage: StageConfig::default(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            id: AgentId::from("optimizer"),
            capabilities: strings(&["route_optimization", "decision_making"]),
            action: "optimize_route".to_string(),
            event: "optimization_complete".to_string(),
            result: json!({
                "recommended_altitude": 39000,
                "estimated_fuel_savings": 450,
                "route": "PTY-BOG",
                "confidence": 0.89,
                "requires_approval": false
            }),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            id: AgentId::from("critic"),
            capabilities: strings(&["performance_monitoring", "feedback_generation"]),
            events: strings(&["optimization_complete"]),
        }
    }
}

impl RelayConfig {
    /// Load `relay.toml` from the working directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if path.exists() {
            return Self::load_from_path(&path);
        }
        Ok(Self::default())
    }

    /// Load from `path` if given, otherwise as [`load`](Self::load)
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Reject configurations the router would refuse or could never finish
    pub fn validate(&self) -> Result<()> {
        if self.router.max_history_size == 0 {
            anyhow::bail!("router.max_history_size must be at least 1");
        }

        let mut ids = vec![&self.coordinator.decomposer, &self.workers.stage.id, &self.workers.recorder.id];
        ids.extend(self.workers.responders.iter().map(|r| &r.id));
        if let Some(id) = ids.iter().find(|id| id.is_broadcast()) {
            anyhow::bail!("Agent id {:?} is reserved for broadcast", id.as_str());
        }

        if self.coordinator.start_action == self.coordinator.end_action {
            anyhow::bail!(
                "coordinator.start_action and coordinator.end_action are both {:?}",
                self.coordinator.start_action
            );
        }

        if self.plan.next_stage.to != self.workers.stage.id {
            tracing::warn!(
                next_stage = %self.plan.next_stage.to,
                stage_worker = %self.workers.stage.id,
                "Plan's next stage is not the configured stage worker"
            );
        }
        Ok(())
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
