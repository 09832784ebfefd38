//! Reference workers
//!
//! Generic stand-ins for domain agents. Each one satisfies the worker
//! contract (reply with the request's correlation id) without domain logic,
//! so the binary and the tests can drive a complete goal workflow.

use super::*;
use serde_json::Value;
use tracing::{debug, info};

/// Answers one request action with a fixed payload
pub struct StaticResponder {
    id: AgentId,
    capabilities: Vec<String>,
    action: String,
    response: Value,
}

impl StaticResponder {
    pub fn new(id: impl Into<AgentId>, capabilities: Vec<String>, action: impl Into<String>, response: Value) -> Self {
        Self {
            id: id.into(),
            capabilities,
            action: action.into(),
            response,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

#[async_trait]
impl Agent for StaticResponder {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn handle_request(&mut self, ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        if message.action() != Some(self.action.as_str()) {
            return Err(AgentError::unsupported(&self.id, message));
        }

        debug!(agent = %self.id, action = %self.action, from = %message.from, "Answering request");
        ctx.reply(message, self.response.clone()).await
    }
}

type Evaluator = Box<dyn Fn(&Value) -> Value + Send + Sync>;

/// Handles the consolidated request of a completed fan-out: replies with a
/// result and broadcasts it as an event
pub struct StageWorker {
    id: AgentId,
    capabilities: Vec<String>,
    action: String,
    event: String,
    result: Value,
    evaluator: Option<Evaluator>,
}

impl StageWorker {
    pub fn new(
        id: impl Into<AgentId>,
        capabilities: Vec<String>,
        action: impl Into<String>,
        event: impl Into<String>,
        result: Value,
    ) -> Self {
        Self {
            id: id.into(),
            capabilities,
            action: action.into(),
            event: event.into(),
            result,
            evaluator: None,
        }
    }

    /// Compute the result from the request payload instead of replying with
    /// the fixed one
    pub fn with_evaluator(mut self, evaluator: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.evaluator = Some(Box::new(evaluator));
        self
    }

    fn evaluate(&self, payload: &Value) -> Value {
        match &self.evaluator {
            Some(evaluate) => evaluate(payload),
            None => self.result.clone(),
        }
    }
}

#[async_trait]
impl Agent for StageWorker {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn handle_request(&mut self, ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        if message.action() != Some(self.action.as_str()) {
            return Err(AgentError::unsupported(&self.id, message));
        }

        let result = self.evaluate(&message.payload);
        info!(
            agent = %self.id,
            session_id = ?message.correlation_id,
            event = %self.event,
            "Stage complete"
        );

        ctx.reply(message, result.clone()).await?;
        ctx.broadcast_event(&self.event, result).await
    }
}

/// Stores broadcast events in the bound session as `last_<event>`
pub struct EventRecorder {
    id: AgentId,
    capabilities: Vec<String>,

    /// Event names to record; empty records every event
    events: Vec<String>,
}

impl EventRecorder {
    pub fn new(id: impl Into<AgentId>, capabilities: Vec<String>, events: Vec<String>) -> Self {
        Self {
            id: id.into(),
            capabilities,
            events,
        }
    }

    fn wants(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event)
    }
}

/// Blackboard key under which [`EventRecorder`] keeps an event's data
pub fn recorded_key(event: &str) -> String {
    format!("last_{}", event)
}

#[async_trait]
impl Agent for EventRecorder {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn handle_request(&mut self, _ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        Err(AgentError::unsupported(&self.id, message))
    }

    async fn handle_event(&mut self, ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        let Some(event) = message.payload.get("event").and_then(Value::as_str) else {
            return Err(AgentError::InvalidPayload("event without a name".into()));
        };
        if !self.wants(event) {
            return Ok(());
        }

        let Some(session) = ctx.session() else {
            debug!(agent = %self.id, event = %event, "No session bound, event not recorded");
            return Ok(());
        };

        let data = message.payload.get("data").cloned().unwrap_or(Value::Null);
        session.set(recorded_key(event), data);
        info!(agent = %self.id, event = %event, session_id = %session.session_id(), "Event recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{MessageKind, MessageRouter, Recipient, RouterConfig};
    use serde_json::json;
    use std::sync::Arc;

    async fn bound<A: Agent>(agent: A) -> (A, AgentContext, Arc<MessageRouter>) {
        let router = MessageRouter::shared(RouterConfig::default());
        let handle = AgentRuntime::new(StaticResponder::new(agent.id().clone(), Vec::new(), "", Value::Null)).handle();
        router.register(handle.clone()).await;
        (agent, AgentContext::new(handle), router)
    }

    fn request(to: &str, action: &str) -> AgentMessage {
        AgentMessage::with_correlation(
            "planner".into(),
            to,
            MessageKind::Request,
            json!({ "action": action }),
            Some("s-1".to_string()),
        )
    }

    #[tokio::test]
    async fn test_static_responder_replies_with_correlation() {
        let responder = StaticResponder::new("fuel", vec![], "get_fuel_analysis", json!({ "confidence": 0.92 }));
        let (mut responder, ctx, router) = bound(responder).await;

        responder.handle_request(&ctx, &request("fuel", "get_fuel_analysis")).await.unwrap();

        let sent = router.history(10).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, MessageKind::Response);
        assert_eq!(sent[0].to, Recipient::from("planner"));
        assert_eq!(sent[0].correlation_id.as_deref(), Some("s-1"));
        assert_eq!(sent[0].payload, json!({ "confidence": 0.92 }));
    }

    #[tokio::test]
    async fn test_static_responder_rejects_other_actions() {
        let responder = StaticResponder::new("fuel", vec![], "get_fuel_analysis", json!({}));
        let (mut responder, ctx, router) = bound(responder).await;

        let err = responder.handle_request(&ctx, &request("fuel", "refuel")).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedAction { action, .. } if action == "refuel"));
        assert_eq!(router.total_messages(), 0);
    }

    #[tokio::test]
    async fn test_stage_worker_replies_then_broadcasts() {
        let worker = StageWorker::new("optimizer", vec![], "optimize_route", "optimization_complete", json!({}))
            .with_evaluator(|payload| json!({ "inputs": payload["fuel_data"].clone() }));
        let (mut worker, ctx, router) = bound(worker).await;

        let mut consolidated = request("optimizer", "optimize_route");
        consolidated.payload["fuel_data"] = json!({ "tankering_savings": 450 });
        worker.handle_request(&ctx, &consolidated).await.unwrap();

        let sent = router.history(10).await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].kind, MessageKind::Response);
        assert_eq!(sent[0].payload, json!({ "inputs": { "tankering_savings": 450 } }));
        assert!(sent[1].is_broadcast());
        assert_eq!(sent[1].kind, MessageKind::Event);
        assert_eq!(sent[1].payload["event"], "optimization_complete");
        assert_eq!(sent[1].payload["data"], sent[0].payload);
    }

    #[tokio::test]
    async fn test_event_recorder_filters_and_stores() {
        let recorder = EventRecorder::new("critic", vec![], vec!["optimization_complete".to_string()]);
        let (mut recorder, ctx, _router) = bound(recorder).await;
        let session = SessionContext::shared("s-1", "goal", None);
        ctx.handle().bind_context(session.clone());

        let event = |name: &str, n: u64| {
            AgentMessage::new(
                "optimizer".into(),
                Recipient::Broadcast,
                MessageKind::Event,
                json!({ "event": name, "data": { "n": n } }),
            )
        };

        recorder.handle_event(&ctx, &event("optimization_complete", 1)).await.unwrap();
        recorder.handle_event(&ctx, &event("severe_weather_alert", 2)).await.unwrap();
        recorder.handle_event(&ctx, &event("optimization_complete", 3)).await.unwrap();

        assert_eq!(session.get("last_optimization_complete"), Some(json!({ "n": 3 })));
        assert_eq!(session.get("last_severe_weather_alert"), None);
    }

    #[tokio::test]
    async fn test_event_recorder_without_session_is_a_no_op() {
        let (mut recorder, ctx, _router) = bound(EventRecorder::new("critic", vec![], vec![])).await;
        let event = AgentMessage::new(
            "optimizer".into(),
            Recipient::Broadcast,
            MessageKind::Event,
            json!({ "event": "anything", "data": 1 }),
        );
        assert!(recorder.handle_event(&ctx, &event).await.is_ok());
    }
}
