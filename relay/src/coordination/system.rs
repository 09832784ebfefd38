//! Running agent loops
//!
//! [`AgentSystem`] spawns one tokio task per agent, registers its handle with
//! the router and cancels every loop on shutdown. Cancellation abandons
//! whatever is still queued.

use super::{Coordinator, MessageRouter};
use crate::agents::{Agent, AgentHandle, AgentId, AgentRuntime, EventRecorder, PlannerAgent, StageWorker, StaticResponder};
use crate::config::RelayConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Owns the processing-loop tasks of a set of agents
pub struct AgentSystem {
    router: Arc<MessageRouter>,
    tasks: Vec<(AgentId, JoinHandle<()>)>,
}

impl AgentSystem {
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self {
            router,
            tasks: Vec::new(),
        }
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Register `agent` and start its loop
    pub async fn spawn<A: Agent>(&mut self, agent: A) -> AgentHandle {
        let runtime = AgentRuntime::new(agent);
        let handle = runtime.handle();

        self.router.register(handle.clone()).await;
        self.tasks.push((handle.id().clone(), runtime.spawn()));
        handle
    }

    /// Number of loops started
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every loop and wait for the tasks to finish
    pub async fn shutdown(self) {
        info!(agents = self.tasks.len(), "Shutting down agent loops");

        for (_, task) in &self.tasks {
            task.abort();
        }
        for (_, task) in self.tasks {
            let _ = task.await;
        }
    }
}

/// Build a running system from configuration: the planner, the configured
/// responders, the next-stage worker and the event recorder.
pub async fn build_system(config: &RelayConfig) -> (AgentSystem, Coordinator) {
    let router = MessageRouter::shared(config.router.clone());
    let mut system = AgentSystem::new(router.clone());

    system
        .spawn(
            PlannerAgent::new(
                config.coordinator.decomposer.clone(),
                config.planner.capabilities.clone(),
                config.plan.clone(),
            )
            .with_commands(
                config.coordinator.start_action.clone(),
                config.coordinator.end_action.clone(),
            ),
        )
        .await;

    for responder in &config.workers.responders {
        system
            .spawn(StaticResponder::new(
                responder.id.clone(),
                responder.capabilities.clone(),
                responder.action.clone(),
                responder.response.clone(),
            ))
            .await;
    }

    let stage = &config.workers.stage;
    system
        .spawn(StageWorker::new(
            stage.id.clone(),
            stage.capabilities.clone(),
            stage.action.clone(),
            stage.event.clone(),
            stage.result.clone(),
        ))
        .await;

    let recorder = &config.workers.recorder;
    system
        .spawn(EventRecorder::new(
            recorder.id.clone(),
            recorder.capabilities.clone(),
            recorder.events.clone(),
        ))
        .await;

    let coordinator = Coordinator::new(router, config.coordinator.clone());
    (system, coordinator)
}
