//! Core Agent Types and Data Structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Reserved recipient value meaning "every other registered agent".
pub const BROADCAST: &str = "broadcast";

/// Unique identifier for an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new random agent ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Sender id used by the coordinator for messages it originates
    pub fn coordinator() -> Self {
        Self("coordinator".to_string())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id collides with the broadcast sentinel
    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Current status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Waiting for the next message
    Idle,

    /// Handling a message
    Working,

    /// Blocked on replies from other agents
    Waiting,

    /// The last handled message failed
    Error,

    /// Finished its part of the workflow
    Completed,
}

impl AgentStatus {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            AgentStatus::Idle => 0,
            AgentStatus::Working => 1,
            AgentStatus::Waiting => 2,
            AgentStatus::Error => 3,
            AgentStatus::Completed => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => AgentStatus::Working,
            2 => AgentStatus::Waiting,
            3 => AgentStatus::Error,
            4 => AgentStatus::Completed,
            _ => AgentStatus::Idle,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Working => "working",
            AgentStatus::Waiting => "waiting",
            AgentStatus::Error => "error",
            AgentStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Running counters for one agent's processing loop
#[derive(Debug, Default)]
pub struct AgentMetrics {
    /// Messages handled without error
    pub tasks_completed: AtomicU64,

    /// Messages whose handler failed
    pub tasks_failed: AtomicU64,

    /// Cumulative handling time of completed messages, in microseconds
    pub total_time_us: AtomicU64,
}

impl AgentMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record successful handling of one message
    pub fn record_success(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_time_us.fetch_add(micros, Ordering::Relaxed);
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed message
    pub fn record_failure(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            total_time_us: self.total_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`AgentMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_time_us: u64,
}

impl MetricsSnapshot {
    /// Mean handling time in seconds; zero-task agents report 0.
    pub fn avg_time_per_task(&self) -> f64 {
        let total_secs = self.total_time_us as f64 / 1_000_000.0;
        total_secs / self.tasks_completed.max(1) as f64
    }

    /// Fraction of handled messages that succeeded; zero-task agents report 1.0.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.tasks_completed + self.tasks_failed;
        if attempted == 0 {
            return 1.0;
        }
        self.tasks_completed as f64 / attempted as f64
    }
}

/// Statistics reported for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Seconds
    pub avg_time_per_task: f64,
    pub success_rate: f64,
}

impl AgentStats {
    pub(crate) fn from_parts(
        agent_id: AgentId,
        status: AgentStatus,
        capabilities: Vec<String>,
        metrics: MetricsSnapshot,
    ) -> Self {
        Self {
            agent_id,
            status,
            capabilities,
            tasks_completed: metrics.tasks_completed,
            tasks_failed: metrics.tasks_failed,
            avg_time_per_task: metrics.avg_time_per_task(),
            success_rate: metrics.success_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id() {
        let id1 = AgentId::new();
        let id2 = AgentId::new();
        assert_ne!(id1, id2);

        assert_eq!(AgentId::coordinator().to_string(), "coordinator");
        assert!(AgentId::from("broadcast").is_broadcast());
        assert!(!AgentId::from("weather").is_broadcast());
    }

    #[test]
    fn test_agent_id_serializes_as_plain_string() {
        let id = AgentId::from("fuel");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"fuel\"");
    }

    #[test]
    fn test_status_round_trips_through_u8() {
        for status in [
            AgentStatus::Idle,
            AgentStatus::Working,
            AgentStatus::Waiting,
            AgentStatus::Error,
            AgentStatus::Completed,
        ] {
            assert_eq!(AgentStatus::from_u8(status.as_u8()), status);
        }
        assert_eq!(serde_json::to_string(&AgentStatus::Working).unwrap(), "\"working\"");
    }

    #[test]
    fn test_agent_metrics() {
        let metrics = AgentMetrics::new();

        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(300));
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_completed, 2);
        assert_eq!(snapshot.tasks_failed, 1);
        assert!((snapshot.avg_time_per_task() - 0.2).abs() < 1e-9);
        assert!((snapshot.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_task_floor() {
        let snapshot = AgentMetrics::new().snapshot();
        assert_eq!(snapshot.avg_time_per_task(), 0.0);
        assert_eq!(snapshot.success_rate(), 1.0);
    }

    #[test]
    fn test_all_failures() {
        let metrics = AgentMetrics::new();
        metrics.record_failure();
        metrics.record_failure();
        assert_eq!(metrics.snapshot().success_rate(), 0.0);
    }
}
