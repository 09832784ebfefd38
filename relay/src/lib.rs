//! Relay - Actor-Style Agent Coordination
//!
//! Relay runs a set of autonomous agents, each with a private inbox and a
//! sequential processing loop, and connects them through a shared router.
//! A coordinator turns a goal into a session blackboard and hands it to a
//! decomposer agent, which fans the work out to peers and joins their
//! replies before advancing to the next stage.
//!
//! # Architecture
//!
//! - `agents` - Agent contract, actor runtime, session blackboard and the built-in agents
//! - `coordination` - Messages, the router and message log, scatter/gather and the coordinator
//! - `config` - TOML configuration for the router, the plan and the reference workers
//! - `commands` - CLI commands and output formatting

pub mod agents;
pub mod coordination;
pub mod config;

// CLI commands
pub mod commands;

// Re-export key types
pub use agents::{Agent, AgentContext, AgentError, AgentHandle, AgentId, AgentRuntime, SessionContext};
pub use config::RelayConfig;
pub use coordination::{
    build_system, AgentMessage, AgentSystem, CoordinationError, Coordinator, MessageKind, MessageRouter, Recipient,
    SessionProgress,
};

/// Relay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
