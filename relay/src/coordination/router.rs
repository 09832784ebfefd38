//! Message Router for agent communication
//!
//! The router keeps the agent registry and an append-only log of every
//! routed message. Unicast delivers into one inbox, broadcast into every
//! registered inbox except the sender's, in registration order. Inboxes are
//! unbounded, so `route` never waits on a recipient.

use super::{AgentMessage, Recipient, SystemStats};
use crate::agents::{AgentHandle, AgentId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Maximum messages retained in the log; older entries are evicted first
    pub max_history_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_history_size: 10_000,
        }
    }
}

/// Registry of agents plus the delivery engine
pub struct MessageRouter {
    /// Registration order is preserved; re-registering keeps the slot
    agents: RwLock<Vec<(AgentId, AgentHandle)>>,

    /// Bounded message log, oldest first
    log: RwLock<VecDeque<AgentMessage>>,

    /// Messages routed over the router's lifetime, including evicted ones
    total_messages: AtomicU64,

    config: RouterConfig,
}

impl MessageRouter {
    pub fn new(config: RouterConfig) -> Self {
        info!(max_history_size = config.max_history_size, "Initializing message router");

        Self {
            agents: RwLock::new(Vec::new()),
            log: RwLock::new(VecDeque::new()),
            total_messages: AtomicU64::new(0),
            config,
        }
    }

    /// Create a router ready to be shared with agents
    pub fn shared(config: RouterConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register an agent and bind this router into it.
    ///
    /// A second registration under the same id replaces the earlier agent.
    pub async fn register(self: &Arc<Self>, agent: AgentHandle) {
        let id = agent.id().clone();
        if id.is_broadcast() {
            warn!(agent = %id, "Refusing to register an agent under the broadcast sentinel");
            return;
        }

        agent.bind_router(self);

        let mut agents = self.agents.write().await;
        match agents.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => {
                info!(agent = %id, "Replacing registered agent");
                slot.1 = agent;
            }
            None => {
                info!(agent = %id, capabilities = ?agent.capabilities(), "Registering agent");
                agents.push((id, agent));
            }
        }
    }

    /// Remove an agent from the registry
    pub async fn unregister(&self, id: &AgentId) -> Option<AgentHandle> {
        let mut agents = self.agents.write().await;
        let position = agents.iter().position(|(existing, _)| existing == id)?;
        info!(agent = %id, "Unregistering agent");
        Some(agents.remove(position).1)
    }

    pub async fn agent(&self, id: &AgentId) -> Option<AgentHandle> {
        self.agents
            .read()
            .await
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, handle)| handle.clone())
    }

    /// Registered agents in registration order
    pub async fn agents(&self) -> Vec<AgentHandle> {
        self.agents.read().await.iter().map(|(_, h)| h.clone()).collect()
    }

    pub async fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.read().await.iter().map(|(id, _)| id.clone()).collect()
    }

    // ==========================================================================
    // Delivery
    // ==========================================================================

    /// Log a message and deliver it. Returns the number of inboxes reached.
    ///
    /// Unknown recipients are a soft failure: the message stays in the log,
    /// a warning is emitted and the sender is not told.
    pub async fn route(&self, message: AgentMessage) -> usize {
        self.append_to_log(&message).await;

        let agents = self.agents.read().await;
        match &message.to {
            Recipient::Broadcast => {
                let mut delivered = 0;
                for (id, handle) in agents.iter().filter(|(id, _)| *id != message.from) {
                    if handle.deliver(message.clone()) {
                        delivered += 1;
                    } else {
                        warn!(agent = %id, message_id = %message.id, "Inbox closed, broadcast copy dropped");
                    }
                }
                debug!(from = %message.from, delivered, "Broadcast routed");
                delivered
            }
            Recipient::Agent(target) => {
                let Some((_, handle)) = agents.iter().find(|(id, _)| id == target) else {
                    warn!(
                        from = %message.from,
                        to = %target,
                        message_id = %message.id,
                        "Unknown recipient, message dropped"
                    );
                    return 0;
                };

                let target = target.clone();
                let message_id = message.id.clone();
                if handle.deliver(message) {
                    debug!(to = %target, message_id = %message_id, "Message delivered");
                    1
                } else {
                    warn!(to = %target, message_id = %message_id, "Inbox closed, message dropped");
                    0
                }
            }
        }
    }

    async fn append_to_log(&self, message: &AgentMessage) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);

        let mut log = self.log.write().await;
        log.push_back(message.clone());

        while log.len() > self.config.max_history_size {
            log.pop_front();
        }
    }

    // ==========================================================================
    // History & Statistics
    // ==========================================================================

    /// The most recent `limit` log entries, oldest first
    pub async fn history(&self, limit: usize) -> Vec<AgentMessage> {
        let log = self.log.read().await;
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    /// The most recent `limit` entries carrying `correlation_id`, oldest first
    pub async fn history_for(&self, correlation_id: &str, limit: usize) -> Vec<AgentMessage> {
        let log = self.log.read().await;
        let mut matching: Vec<AgentMessage> = log
            .iter()
            .rev()
            .filter(|m| m.correlation_id.as_deref() == Some(correlation_id))
            .take(limit)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }

    /// Messages routed over the router's lifetime
    pub fn total_messages(&self) -> u64 {
        self.total_messages.load(Ordering::Relaxed)
    }

    /// Per-agent statistics plus the message count
    pub async fn system_stats(&self) -> SystemStats {
        let agents = self.agents.read().await;
        SystemStats {
            total_agents: agents.len(),
            agents: agents.iter().map(|(_, h)| h.stats()).collect(),
            total_messages: self.total_messages(),
        }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}
