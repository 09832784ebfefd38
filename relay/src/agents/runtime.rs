//! Actor runtime: inbox, processing loop and handler context
//!
//! Each agent gets an unbounded `mpsc` inbox. [`AgentHandle::deliver`] never
//! blocks and never rejects, so a broadcast cannot stall behind a slow
//! recipient. [`AgentRuntime::run`] dequeues one message at a time, which is
//! the only suspension point of the loop; handler failures (errors and
//! panics) are contained inside the loop.

use super::{Agent, AgentError, AgentId, AgentMetrics, AgentStats, AgentStatus, Result, SessionContext};
use crate::coordination::{AgentMessage, MessageKind, MessageRouter, Recipient};
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

struct AgentShared {
    id: AgentId,
    capabilities: Vec<String>,
    status: AtomicU8,
    metrics: AgentMetrics,
    inbox: mpsc::UnboundedSender<AgentMessage>,
    session: RwLock<Option<Arc<SessionContext>>>,
    router: RwLock<Option<Weak<MessageRouter>>>,
}

/// Thread-safe handle to a running agent
///
/// Cloning is cheap. The router keeps one per registered agent and the
/// processing loop keeps another for its handlers.
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<AgentShared>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

impl AgentHandle {
    pub fn id(&self) -> &AgentId {
        &self.inner.id
    }

    pub fn capabilities(&self) -> &[String] {
        &self.inner.capabilities
    }

    /// Enqueue a message; returns `false` when the loop is gone.
    ///
    /// Only the router calls this.
    pub fn deliver(&self, message: AgentMessage) -> bool {
        self.inner.inbox.send(message).is_ok()
    }

    /// Replace the active session; last writer wins
    pub fn bind_context(&self, session: Arc<SessionContext>) {
        *self.inner.session.write() = Some(session);
    }

    /// Drop the active session binding
    pub fn unbind_context(&self) -> Option<Arc<SessionContext>> {
        self.inner.session.write().take()
    }

    /// Currently bound session
    pub fn session(&self) -> Option<Arc<SessionContext>> {
        self.inner.session.read().clone()
    }

    /// Bind the router used by [`send`](Self::send). The agent keeps a weak
    /// reference so the router owns the registry without a cycle.
    pub fn bind_router(&self, router: &Arc<MessageRouter>) {
        *self.inner.router.write() = Some(Arc::downgrade(router));
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: AgentStatus) {
        self.inner.status.store(status.as_u8(), Ordering::Release);
    }

    pub fn metrics(&self) -> &AgentMetrics {
        &self.inner.metrics
    }

    /// Performance statistics for this agent
    pub fn stats(&self) -> AgentStats {
        AgentStats::from_parts(
            self.inner.id.clone(),
            self.status(),
            self.inner.capabilities.clone(),
            self.inner.metrics.snapshot(),
        )
    }

    /// Whether both handles refer to the same agent instance
    pub fn same_agent(&self, other: &AgentHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn router(&self) -> Result<Arc<MessageRouter>> {
        self.inner
            .router
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| AgentError::RouterNotBound(self.inner.id.clone()))
    }

    /// Build a message from this agent and hand it to the router.
    ///
    /// Returns once the message is enqueued (or dropped), never once it is processed.
    pub async fn send(
        &self,
        to: impl Into<Recipient>,
        kind: MessageKind,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Result<()> {
        let router = self.router()?;
        let message = AgentMessage::with_correlation(self.inner.id.clone(), to, kind, payload, correlation_id);
        router.route(message).await;
        Ok(())
    }

    /// Broadcast `{event, data}` to every other registered agent
    pub async fn broadcast_event(&self, event_type: &str, data: serde_json::Value) -> Result<()> {
        self.send(
            Recipient::Broadcast,
            MessageKind::Event,
            serde_json::json!({ "event": event_type, "data": data }),
            None,
        )
        .await
    }
}

/// What a handler sees of its own agent while processing a message
pub struct AgentContext {
    handle: AgentHandle,
}

impl AgentContext {
    pub fn new(handle: AgentHandle) -> Self {
        Self { handle }
    }

    pub fn id(&self) -> &AgentId {
        self.handle.id()
    }

    pub fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    /// Currently bound session, if any
    pub fn session(&self) -> Option<Arc<SessionContext>> {
        self.handle.session()
    }

    /// Bound session, or [`AgentError::NoSession`]
    pub fn require_session(&self) -> Result<Arc<SessionContext>> {
        self.session()
            .ok_or_else(|| AgentError::NoSession(self.handle.id().clone()))
    }

    pub fn set_status(&self, status: AgentStatus) {
        self.handle.set_status(status);
    }

    pub async fn send(
        &self,
        to: impl Into<Recipient>,
        kind: MessageKind,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Result<()> {
        self.handle.send(to, kind, payload, correlation_id).await
    }

    /// Answer `request` with a Response carrying its correlation id
    pub async fn reply(&self, request: &AgentMessage, payload: serde_json::Value) -> Result<()> {
        self.handle
            .send(
                request.from.clone(),
                MessageKind::Response,
                payload,
                request.correlation_id.clone(),
            )
            .await
    }

    pub async fn broadcast_event(&self, event_type: &str, data: serde_json::Value) -> Result<()> {
        self.handle.broadcast_event(event_type, data).await
    }
}

/// Owns an agent's behaviour and inbox and runs its processing loop
pub struct AgentRuntime<A: Agent> {
    agent: A,
    handle: AgentHandle,
    inbox: mpsc::UnboundedReceiver<AgentMessage>,
}

impl<A: Agent> AgentRuntime<A> {
    /// Wrap an agent; the loop does not run until [`run`](Self::run) or [`spawn`](Self::spawn)
    pub fn new(agent: A) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = AgentHandle {
            inner: Arc::new(AgentShared {
                id: agent.id().clone(),
                capabilities: agent.capabilities().to_vec(),
                status: AtomicU8::new(AgentStatus::Idle.as_u8()),
                metrics: AgentMetrics::new(),
                inbox: tx,
                session: RwLock::new(None),
                router: RwLock::new(None),
            }),
        };

        Self {
            agent,
            handle,
            inbox: rx,
        }
    }

    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    /// Run the processing loop on a tokio task. Abort the returned handle to
    /// cancel the loop; queued messages are abandoned.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process messages one at a time until the task is cancelled. The
    /// runtime keeps a sender of its own inbox, so `recv` never sees the
    /// channel close while the loop runs.
    pub async fn run(mut self) {
        debug!(agent = %self.handle.id(), "Agent loop started");

        while let Some(message) = self.inbox.recv().await {
            self.process(message).await;
        }

        warn!(agent = %self.handle.id(), "Agent inbox closed unexpectedly, loop exiting");
    }

    /// Handle exactly one message, containing any failure
    async fn process(&mut self, message: AgentMessage) {
        let ctx = AgentContext::new(self.handle.clone());
        self.handle.set_status(AgentStatus::Working);

        debug!(
            agent = %self.handle.id(),
            kind = %message.kind,
            from = %message.from,
            message_id = %message.id,
            "Handling message"
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(dispatch(&mut self.agent, &ctx, &message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(AgentError::HandlerPanicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(()) => {
                self.handle.metrics().record_success(started.elapsed());
                // Handlers may park the agent in Waiting or Completed.
                let _ = self.handle.inner.status.compare_exchange(
                    AgentStatus::Working.as_u8(),
                    AgentStatus::Idle.as_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
            Err(err) => {
                self.handle.set_status(AgentStatus::Error);
                self.handle.metrics().record_failure();

                let hook = AssertUnwindSafe(self.agent.on_error(&ctx, &err)).catch_unwind().await;
                if let Err(panic) = hook {
                    error!(
                        agent = %self.handle.id(),
                        panic = %panic_message(panic.as_ref()),
                        "Error hook panicked"
                    );
                }
            }
        }
    }
}

async fn dispatch<A: Agent>(agent: &mut A, ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
    match message.kind {
        MessageKind::Request => agent.handle_request(ctx, message).await,
        MessageKind::Response => agent.handle_response(ctx, message).await,
        MessageKind::Event => agent.handle_event(ctx, message).await,
        MessageKind::Command => agent.handle_command(ctx, message).await,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        warn!("Handler panicked with a non-string payload");
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct Flaky {
        id: AgentId,
        caps: Vec<String>,
        seen: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Agent for Flaky {
        fn id(&self) -> &AgentId {
            &self.id
        }

        fn capabilities(&self) -> &[String] {
            &self.caps
        }

        async fn handle_request(&mut self, _ctx: &AgentContext, message: &AgentMessage) -> Result<()> {
            let action = message.action().unwrap_or_default().to_string();
            self.seen.lock().push(action.clone());
            match action.as_str() {
                "fail" => Err(AgentError::InvalidPayload("boom".into())),
                "panic" => panic!("handler exploded"),
                _ => Ok(()),
            }
        }

        async fn handle_command(&mut self, ctx: &AgentContext, _message: &AgentMessage) -> Result<()> {
            ctx.set_status(AgentStatus::Waiting);
            Ok(())
        }
    }

    fn flaky() -> (Flaky, Arc<parking_lot::Mutex<Vec<String>>>) {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        (
            Flaky {
                id: AgentId::from("flaky"),
                caps: vec!["testing".to_string()],
                seen: seen.clone(),
            },
            seen,
        )
    }

    fn request(action: &str) -> AgentMessage {
        AgentMessage::new("tester".into(), "flaky", MessageKind::Request, json!({ "action": action }))
    }

    async fn wait_for_processed(handle: &AgentHandle, count: u64) {
        for _ in 0..200 {
            let snap = handle.metrics().snapshot();
            if snap.tasks_completed + snap.tasks_failed >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("agent did not process {} messages in time", count);
    }

    #[tokio::test]
    async fn test_fresh_agent_stats() {
        let (agent, _) = flaky();
        let runtime = AgentRuntime::new(agent);
        let stats = runtime.handle().stats();

        assert_eq!(stats.agent_id, AgentId::from("flaky"));
        assert_eq!(stats.status, AgentStatus::Idle);
        assert_eq!(stats.capabilities, vec!["testing".to_string()]);
        assert_eq!(stats.avg_time_per_task, 0.0);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_errors_and_panics_do_not_stop_the_loop() {
        let (agent, seen) = flaky();
        let runtime = AgentRuntime::new(agent);
        let handle = runtime.handle();

        for action in ["ok", "fail", "panic", "ok", "fail"] {
            assert!(handle.deliver(request(action)));
        }

        let task = runtime.spawn();
        wait_for_processed(&handle, 5).await;

        let stats = handle.stats();
        assert_eq!(stats.tasks_completed, 2);
        assert_eq!(stats.tasks_failed, 3);
        assert_eq!(stats.status, AgentStatus::Error);
        assert!((stats.success_rate - 0.4).abs() < 1e-9);
        assert_eq!(*seen.lock(), vec!["ok", "fail", "panic", "ok", "fail"]);

        handle.deliver(request("ok"));
        wait_for_processed(&handle, 6).await;
        assert_eq!(handle.status(), AgentStatus::Idle);

        task.abort();
    }

    #[tokio::test]
    async fn test_handler_status_is_kept() {
        let (agent, _) = flaky();
        let runtime = AgentRuntime::new(agent);
        let handle = runtime.handle();
        let task = runtime.spawn();

        handle.deliver(AgentMessage::new("c".into(), "flaky", MessageKind::Command, json!({})));
        wait_for_processed(&handle, 1).await;
        assert_eq!(handle.status(), AgentStatus::Waiting);

        task.abort();
    }

    #[tokio::test]
    async fn test_loop_runs_until_cancelled() {
        let (agent, _) = flaky();
        let runtime = AgentRuntime::new(agent);
        let handle = runtime.handle();
        let task = runtime.spawn();

        handle.deliver(request("ok"));
        wait_for_processed(&handle, 1).await;
        drop(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_send_without_router_fails() {
        let (agent, _) = flaky();
        let runtime = AgentRuntime::new(agent);
        let handle = runtime.handle();

        let err = handle
            .send("anyone", MessageKind::Request, json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RouterNotBound(id) if id.as_str() == "flaky"));
    }

    #[tokio::test]
    async fn test_send_after_router_dropped_fails() {
        let (agent, _) = flaky();
        let runtime = AgentRuntime::new(agent);
        let handle = runtime.handle();

        let router = MessageRouter::shared(Default::default());
        handle.bind_router(&router);
        drop(router);

        let err = handle.broadcast_event("gone", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::RouterNotBound(_)));
    }

    #[tokio::test]
    async fn test_context_binding_last_writer_wins() {
        let (agent, _) = flaky();
        let handle = AgentRuntime::new(agent).handle();
        assert!(handle.session().is_none());

        handle.bind_context(SessionContext::shared("s-1", "first", None));
        handle.bind_context(SessionContext::shared("s-2", "second", None));
        assert_eq!(handle.session().unwrap().session_id(), "s-2");

        assert!(handle.unbind_context().is_some());
        assert!(handle.session().is_none());
    }

    #[tokio::test]
    async fn test_deliver_after_abort_reports_closed() {
        let (agent, _) = flaky();
        let runtime = AgentRuntime::new(agent);
        let handle = runtime.handle();
        let task = runtime.spawn();

        task.abort();
        let _ = task.await;
        assert!(!handle.deliver(request("ok")));
    }
}
