//! Coordinator - goal session lifecycle
//!
//! The coordinator turns a goal into a [`SessionContext`], binds it into every
//! registered agent and starts the workflow by commanding the decomposer.

use super::*;
use crate::agents::{AgentId, SessionContext};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Error text reported by [`Coordinator::progress`] for an unknown id
pub const UNKNOWN_SESSION: &str = "unknown session";

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Agent that receives the start command
    pub decomposer: AgentId,

    /// `action` of the start command
    pub start_action: String,

    /// `action` of the command sent when a session ends
    pub end_action: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            decomposer: AgentId::from("planner"),
            start_action: "start".to_string(),
            end_action: "end".to_string(),
        }
    }
}

/// Progress report for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionProgress {
    Active {
        session_id: String,
        goal: String,
        data: Map<String, Value>,
        system_stats: SystemStats,
    },
    Unknown {
        error: String,
    },
}

impl SessionProgress {
    pub fn is_unknown(&self) -> bool {
        matches!(self, SessionProgress::Unknown { .. })
    }

    /// Blackboard contents of an active session
    pub fn data(&self) -> Option<&Map<String, Value>> {
        match self {
            SessionProgress::Active { data, .. } => Some(data),
            SessionProgress::Unknown { .. } => None,
        }
    }
}

/// Session lifecycle manager
pub struct Coordinator {
    router: Arc<MessageRouter>,
    sessions: RwLock<HashMap<String, Arc<SessionContext>>>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(router: Arc<MessageRouter>, config: CoordinatorConfig) -> Self {
        Self {
            router,
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Open a session for `goal` and bind it into every registered agent.
    ///
    /// Agents hold one session at a time, so a new goal replaces whatever
    /// session they were bound to before.
    pub async fn set_goal(&self, goal: impl Into<String>, initial_data: Option<Map<String, Value>>) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = SessionContext::shared(session_id.clone(), goal, initial_data);

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());

        let agents = self.router.agents().await;
        for agent in &agents {
            agent.bind_context(session.clone());
        }

        info!(
            session_id = %session_id,
            goal = %session.goal(),
            bound_agents = agents.len(),
            "New goal set"
        );
        session_id
    }

    /// Send the start command for `session_id` to the decomposer
    pub async fn start_optimization(&self, session_id: &str) -> Result<()> {
        let session = self
            .session(session_id)
            .await
            .ok_or_else(|| CoordinationError::UnknownSession(session_id.to_string()))?;

        let command = AgentMessage::with_correlation(
            AgentId::coordinator(),
            self.config.decomposer.clone(),
            MessageKind::Command,
            json!({
                "action": self.config.start_action,
                "session_id": session_id,
                "goal": session.goal(),
            }),
            Some(session_id.to_string()),
        );

        info!(session_id = %session_id, decomposer = %self.config.decomposer, "Starting workflow");
        if self.router.route(command).await == 0 {
            warn!(
                session_id = %session_id,
                decomposer = %self.config.decomposer,
                "Start command was not delivered"
            );
        }
        Ok(())
    }

    /// Goal, blackboard and router statistics for a session; read-only
    pub async fn progress(&self, session_id: &str) -> SessionProgress {
        let Some(session) = self.session(session_id).await else {
            return SessionProgress::Unknown {
                error: UNKNOWN_SESSION.to_string(),
            };
        };

        SessionProgress::Active {
            session_id: session_id.to_string(),
            goal: session.goal().to_string(),
            data: session.snapshot(),
            system_stats: self.router.system_stats().await,
        }
    }

    pub async fn session(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Discard a session, unbind agents still holding it and tell the
    /// decomposer to drop its join state. Late replies for the session are
    /// ignored afterwards.
    pub async fn end_session(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        let session = self.sessions.write().await.remove(session_id)?;

        let command = AgentMessage::with_correlation(
            AgentId::coordinator(),
            self.config.decomposer.clone(),
            MessageKind::Command,
            json!({ "action": self.config.end_action, "session_id": session_id }),
            Some(session_id.to_string()),
        );
        self.router.route(command).await;

        for agent in self.router.agents().await {
            if agent
                .session()
                .is_some_and(|bound| Arc::ptr_eq(&bound, &session))
            {
                agent.unbind_context();
            }
        }

        info!(session_id = %session_id, "Session ended");
        Some(session)
    }
}
