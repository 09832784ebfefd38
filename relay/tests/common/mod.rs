//! Common test utilities for Relay tests
//!
//! This module provides a recording agent and polling helpers shared by the
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use relay::agents::*;
use relay::coordination::{AgentMessage, MessageKind};

/// Messages seen by a [`Tap`], in processing order
pub type TapLog = Arc<Mutex<Vec<AgentMessage>>>;

/// Agent that records every message it handles.
///
/// Requests whose `action` equals `fail_on` fail the handler; requests with
/// `"reply": true` are answered with `{"echo": <payload>}`.
pub struct Tap {
    id: AgentId,
    capabilities: Vec<String>,
    log: TapLog,
    fail_on: Option<String>,
}

impl Tap {
    pub fn new(id: &str) -> (Self, TapLog) {
        let log = TapLog::default();
        (
            Self {
                id: AgentId::from(id),
                capabilities: vec!["tapping".to_string()],
                log: log.clone(),
                fail_on: None,
            },
            log,
        )
    }

    pub fn failing_on(mut self, action: &str) -> Self {
        self.fail_on = Some(action.to_string());
        self
    }

    fn record(&self, message: &AgentMessage) {
        self.log.lock().push(message.clone());
    }
}

#[async_trait]
impl Agent for Tap {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn handle_request(&mut self, ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        self.record(message);

        if message.action().is_some() && message.action() == self.fail_on.as_deref() {
            return Err(AgentError::InvalidPayload(format!("{} refused", self.id)));
        }
        if message.payload.get("reply").and_then(Value::as_bool) == Some(true) {
            ctx.reply(message, serde_json::json!({ "echo": message.payload })).await?;
        }
        Ok(())
    }

    async fn handle_response(&mut self, _ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        self.record(message);
        Ok(())
    }

    async fn handle_event(&mut self, _ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        self.record(message);
        Ok(())
    }

    async fn handle_command(&mut self, _ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
        self.record(message);
        Ok(())
    }
}

/// Poll `condition` every few milliseconds; panics after two seconds
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Wait until `log` holds at least `count` messages
pub async fn wait_for_messages(log: &TapLog, count: usize) {
    wait_until(&format!("{} messages", count), || log.lock().len() >= count).await;
}

/// Wait until `handle` has processed `count` messages, successfully or not
pub async fn wait_for_processed(handle: &AgentHandle, count: u64) {
    wait_until(&format!("{} processed by {}", count, handle.id()), || {
        let snap = handle.metrics().snapshot();
        snap.tasks_completed + snap.tasks_failed >= count
    })
    .await;
}

/// Request with an `n` sequence number in its payload
pub fn numbered(from: &str, to: &str, n: u64) -> AgentMessage {
    AgentMessage::new(
        AgentId::from(from),
        to,
        MessageKind::Request,
        serde_json::json!({ "action": "count", "n": n }),
    )
}

/// The `n` payload fields of a tap log, in order
pub fn sequence(log: &TapLog) -> Vec<u64> {
    log.lock()
        .iter()
        .filter_map(|m| m.payload.get("n").and_then(Value::as_u64))
        .collect()
}
