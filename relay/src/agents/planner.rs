//! Planner Agent Implementation
//!
//! The planner is the decomposer role. On the coordinator's start command it
//! fans the goal out into the requests of its [`FanOutPlan`], all carrying
//! the session id as correlation id, and joins the replies with a
//! [`ScatterGather`]. The first time nothing is outstanding it sends one
//! consolidated request to the next stage.
//!
//! Join progress is mirrored into the session blackboard:
//!
//! - `planning_status` - `"waiting"`, `"advancing"`, then `"completed"` once
//!   the next stage replies
//! - `pending_responses` - responders still outstanding
//! - `<responder>_data` - each collected reply, and the next stage's reply
//!
//! Join state lives until the next stage's reply is stored or the
//! coordinator sends the end command for the session.

use super::*;
use crate::coordination::{
    data_key, FanOutPlan, GatherOutcome, GatherPhase, IgnoreReason, MessageKind, ScatterGather,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Blackboard key holding the join phase
pub const PLANNING_STATUS: &str = "planning_status";

/// Blackboard key holding the outstanding responders
pub const PENDING_RESPONSES: &str = "pending_responses";

/// Decomposer that runs one scatter/gather per session
pub struct PlannerAgent {
    id: AgentId,
    capabilities: Vec<String>,
    plan: FanOutPlan,

    /// Command `action` that starts a session's fan-out
    start_action: String,

    /// Command `action` that discards a session's join state
    end_action: String,

    /// Join state by session id; a session without an entry is idle
    gathers: HashMap<String, ScatterGather>,
}

impl PlannerAgent {
    pub fn new(id: impl Into<AgentId>, capabilities: Vec<String>, plan: FanOutPlan) -> Self {
        Self {
            id: id.into(),
            capabilities,
            plan,
            start_action: "start".to_string(),
            end_action: "end".to_string(),
            gathers: HashMap::new(),
        }
    }

    /// Override the command actions the planner answers to
    pub fn with_commands(mut self, start_action: impl Into<String>, end_action: impl Into<String>) -> Self {
        self.start_action = start_action.into();
        self.end_action = end_action.into();
        self
    }

    /// Planner named `planner` with the default plan
    pub fn with_plan(plan: FanOutPlan) -> Self {
        Self::new(
            "planner",
            vec![
                "goal_decomposition".to_string(),
                "task_assignment".to_string(),
                "workflow_management".to_string(),
            ],
            plan,
        )
    }

    pub fn plan(&self) -> &FanOutPlan {
        &self.plan
    }

    /// Phase of the join for `session_id`, `None` while idle
    pub fn phase(&self, session_id: &str) -> Option<GatherPhase> {
        self.gathers.get(session_id).map(ScatterGather::phase)
    }

    /// Sessions with join state held
    pub fn active_sessions(&self) -> usize {
        self.gathers.len()
    }

    fn end_session(&mut self, message: &AgentMessage) -> Result<()> {
        let session_id = session_id_of(message)?;
        match self.gathers.remove(&session_id) {
            Some(join) => info!(
                agent = %self.id,
                session_id = %session_id,
                phase = %join.phase(),
                outstanding = join.pending().len(),
                "Session ended, join state discarded"
            ),
            None => debug!(agent = %self.id, session_id = %session_id, "End command for idle session"),
        }
        Ok(())
    }

    /// The bound session, if it is the one `session_id` names
    fn session_for(ctx: &AgentContext, session_id: &str) -> Option<Arc<SessionContext>> {
        let session = ctx.session().filter(|s| s.session_id() == session_id);
        if session.is_none() {
            debug!(agent = %ctx.id(), session_id = %session_id, "Session not bound, blackboard not updated");
        }
        session
    }

    async fn decompose_and_delegate(&mut self, ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        let session_id = session_id_of(message)?;
        let goal = message.payload.get("goal").and_then(Value::as_str).unwrap_or_default();

        if let Some(existing) = self.gathers.get(&session_id) {
            warn!(
                session_id = %session_id,
                phase = %existing.phase(),
                "Start command for a session already in progress, ignored"
            );
            return Ok(());
        }
        let completed = Self::session_for(ctx, &session_id)
            .and_then(|s| s.get(PLANNING_STATUS))
            .is_some_and(|status| status == "completed");
        if completed {
            warn!(session_id = %session_id, "Start command for a completed session, ignored");
            return Ok(());
        }

        info!(agent = %self.id, session_id = %session_id, goal = %goal, "Decomposing goal");

        let join = ScatterGather::new(session_id.clone(), self.plan.responders());
        if let Some(session) = Self::session_for(ctx, &session_id) {
            let pending = pending_value(&join);
            session.update_with(|data| {
                data.insert(PLANNING_STATUS.to_string(), json!(GatherPhase::Waiting.as_str()));
                data.insert(PENDING_RESPONSES.to_string(), pending);
            });
        }
        self.gathers.insert(session_id.clone(), join);

        for request in &self.plan.requests {
            ctx.send(
                request.to.clone(),
                MessageKind::Request,
                request.payload.clone(),
                Some(session_id.clone()),
            )
            .await?;
        }
        ctx.set_status(AgentStatus::Waiting);

        // A plan with no responders has nothing to wait for.
        let collected = self.gathers.get_mut(&session_id).and_then(ScatterGather::try_advance);
        if let Some(collected) = collected {
            self.advance(ctx, &session_id, &collected).await?;
        }

        Ok(())
    }

    async fn advance(&self, ctx: &AgentContext, session_id: &str, collected: &[(AgentId, Value)]) -> Result<()> {
        info!(
            agent = %self.id,
            session_id = %session_id,
            responses = collected.len(),
            next_stage = %self.plan.next_stage.to,
            "All data collected, triggering next stage"
        );

        if let Some(session) = Self::session_for(ctx, session_id) {
            session.set(PLANNING_STATUS, json!(GatherPhase::Advancing.as_str()));
        }

        ctx.send(
            self.plan.next_stage.to.clone(),
            MessageKind::Request,
            self.plan.consolidated_payload(collected),
            Some(session_id.to_string()),
        )
        .await?;
        ctx.set_status(AgentStatus::Idle);
        Ok(())
    }

    fn record_stage_result(&mut self, ctx: &AgentContext, session_id: &str, message: &AgentMessage) {
        self.gathers.remove(session_id);
        let Some(session) = Self::session_for(ctx, session_id) else {
            return;
        };

        let key = data_key(&message.from);
        let stored = session.update_with(|data| {
            if data.get(PLANNING_STATUS).and_then(Value::as_str) == Some("completed") {
                return false;
            }
            data.insert(key, message.payload.clone());
            data.insert(PLANNING_STATUS.to_string(), json!("completed"));
            true
        });

        if stored {
            info!(session_id = %session_id, stage = %message.from, "Next stage result stored");
            ctx.set_status(AgentStatus::Completed);
        } else {
            warn!(session_id = %session_id, stage = %message.from, "Duplicate next stage result ignored");
        }
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn handle_request(&mut self, _ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        Err(AgentError::unsupported(&self.id, message))
    }

    async fn handle_command(&mut self, ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        match message.action() {
            Some(action) if action == self.start_action => self.decompose_and_delegate(ctx, message).await,
            Some(action) if action == self.end_action => self.end_session(message),
            other => {
                debug!(agent = %self.id, action = ?other, "Ignoring command");
                Ok(())
            }
        }
    }

    async fn handle_response(&mut self, ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        let Some(session_id) = message.correlation_id.clone() else {
            warn!(from = %message.from, "Response without correlation id ignored");
            return Ok(());
        };

        let Some(join) = self.gathers.get_mut(&session_id) else {
            warn!(from = %message.from, session_id = %session_id, "Response for unknown session ignored");
            return Ok(());
        };

        match join.record(&message.from, message.payload.clone()) {
            GatherOutcome::Recorded { remaining } => {
                let pending = pending_value(join);
                if let Some(session) = Self::session_for(ctx, &session_id) {
                    let key = data_key(&message.from);
                    session.update_with(|data| {
                        data.insert(PENDING_RESPONSES.to_string(), pending);
                        data.insert(key, message.payload.clone());
                    });
                }
                info!(from = %message.from, session_id = %session_id, remaining, "Received data");
                ctx.set_status(AgentStatus::Waiting);
            }
            GatherOutcome::Complete(collected) => {
                if let Some(session) = Self::session_for(ctx, &session_id) {
                    let key = data_key(&message.from);
                    session.update_with(|data| {
                        data.insert(PENDING_RESPONSES.to_string(), json!([]));
                        data.insert(key, message.payload.clone());
                    });
                }
                info!(from = %message.from, session_id = %session_id, remaining = 0, "Received data");
                self.advance(ctx, &session_id, &collected).await?;
            }
            GatherOutcome::Ignored(IgnoreReason::AlreadyAdvanced)
                if message.from == self.plan.next_stage.to =>
            {
                self.record_stage_result(ctx, &session_id, message);
            }
            GatherOutcome::Ignored(reason) => {
                warn!(
                    from = %message.from,
                    session_id = %session_id,
                    reason = ?reason,
                    "Response ignored"
                );
            }
        }

        Ok(())
    }
}

fn session_id_of(message: &AgentMessage) -> Result<String> {
    message
        .payload
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AgentError::InvalidPayload(format!("{:?} command without session_id", message.action())))
}

fn pending_value(join: &ScatterGather) -> Value {
    Value::Array(
        join.pending()
            .into_iter()
            .map(|id| Value::String(id.to_string()))
            .collect(),
    )
}
