//! Agent Contract and Actor Runtime
//!
//! This module provides the actor abstraction of the Relay coordination layer.
//! Every agent owns a private inbox and a sequential processing loop; agents
//! run concurrently with one another and talk only through the
//! [`MessageRouter`](crate::coordination::MessageRouter).
//!
//! # Architecture
//!
//! - [`Agent`] is the behaviour: one mandatory request handler plus optional
//!   response, event and command handlers that default to no-ops
//! - [`AgentRuntime`] owns the behaviour and the inbox receiver and runs the loop
//! - [`AgentHandle`] is the cloneable, thread-safe side the router delivers into
//! - [`SessionContext`] is the goal-scoped blackboard shared by bound agents
//!
//! # Agent Roles
//!
//! - `PlannerAgent` - Decomposes a goal with scatter/gather and advances to the next stage
//! - `StaticResponder` - Answers one request action with a fixed payload
//! - `StageWorker` - Handles the consolidated request and broadcasts completion
//! - `EventRecorder` - Stores broadcast events in the session blackboard

use crate::coordination::AgentMessage;
use async_trait::async_trait;
use tracing::warn;

pub mod types;
pub mod session;
pub mod runtime;
pub mod planner;
pub mod workers;

pub use types::*;
pub use session::SessionContext;
pub use runtime::{AgentContext, AgentHandle, AgentRuntime};
pub use planner::{PlannerAgent, PENDING_RESPONSES, PLANNING_STATUS};
pub use workers::{recorded_key, EventRecorder, StageWorker, StaticResponder};

/// Behaviour plugged into an [`AgentRuntime`]
///
/// The runtime calls exactly one handler per message, chosen by
/// [`MessageKind`](crate::coordination::MessageKind), and never calls two
/// handlers of the same agent concurrently.
#[async_trait]
pub trait Agent: Send + 'static {
    /// Identifier, unique within a router
    fn id(&self) -> &AgentId;

    /// Descriptive capability tags
    fn capabilities(&self) -> &[String];

    /// Handle a request addressed to this agent
    async fn handle_request(&mut self, ctx: &AgentContext, message: &AgentMessage) -> Result<()>;

    /// Handle a reply to a request this agent sent
    async fn handle_response(&mut self, _ctx: &AgentContext, _message: &AgentMessage) -> Result<()> {
        Ok(())
    }

    /// Handle a broadcast event
    async fn handle_event(&mut self, _ctx: &AgentContext, _message: &AgentMessage) -> Result<()> {
        Ok(())
    }

    /// Handle a command from the coordinator
    async fn handle_command(&mut self, _ctx: &AgentContext, _message: &AgentMessage) -> Result<()> {
        Ok(())
    }

    /// Called after a handler failed; the loop continues afterwards
    async fn on_error(&mut self, ctx: &AgentContext, error: &AgentError) {
        warn!(agent = %ctx.id(), error = %error, "Message handler failed");
    }
}

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent-specific errors
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent {0} is not bound to a router")]
    RouterNotBound(AgentId),

    #[error("Agent {agent} does not support action {action:?}")]
    UnsupportedAction { agent: AgentId, action: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Agent {0} has no session bound")]
    NoSession(AgentId),

    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),
}

impl AgentError {
    pub(crate) fn unsupported(agent: &AgentId, message: &AgentMessage) -> Self {
        AgentError::UnsupportedAction {
            agent: agent.clone(),
            action: message.action().unwrap_or("<none>").to_string(),
        }
    }
}
