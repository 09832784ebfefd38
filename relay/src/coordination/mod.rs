//! Coordination: messaging, routing and goal workflows
//!
//! Message routing between registered agents, the coordinator that owns
//! goal sessions, and the scatter/gather join used by the decomposer role.

use serde::{Deserialize, Serialize};

pub mod message;
pub mod router;
pub mod scatter_gather;
pub mod coordinator;
pub mod system;

pub use message::*;
pub use router::*;
pub use scatter_gather::*;
pub use coordinator::*;
pub use system::*;

/// Result type for coordination operations
pub type Result<T> = std::result::Result<T, CoordinationError>;

/// Coordination errors
#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

/// Router-wide statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_agents: usize,
    pub agents: Vec<crate::agents::AgentStats>,
    pub total_messages: u64,
}
