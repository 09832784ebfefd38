//! Message envelope exchanged between agents
//!
//! An [`AgentMessage`] is immutable once built. Its serde form is the wire
//! shape used for history export:
//!
//! ```json
//! {"id": "...", "from": "planner", "to": "weather", "type": "request",
//!  "payload": {...}, "timestamp": "2024-05-01T12:00:00Z", "correlation_id": "..."}
//! ```

use crate::agents::{AgentId, BROADCAST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of communication carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Event,
    Command,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Event => "event",
            MessageKind::Command => "command",
        };
        f.write_str(s)
    }
}

/// Destination of a message: one agent or every other registered agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Recipient {
    Agent(AgentId),
    Broadcast,
}

impl Recipient {
    /// The targeted agent, `None` for broadcasts
    pub fn agent(&self) -> Option<&AgentId> {
        match self {
            Recipient::Agent(id) => Some(id),
            Recipient::Broadcast => None,
        }
    }
}

impl From<String> for Recipient {
    fn from(value: String) -> Self {
        if value == BROADCAST {
            Recipient::Broadcast
        } else {
            Recipient::Agent(AgentId::from(value))
        }
    }
}

impl From<Recipient> for String {
    fn from(value: Recipient) -> Self {
        match value {
            Recipient::Agent(id) => id.to_string(),
            Recipient::Broadcast => BROADCAST.to_string(),
        }
    }
}

impl From<AgentId> for Recipient {
    fn from(id: AgentId) -> Self {
        if id.is_broadcast() {
            Recipient::Broadcast
        } else {
            Recipient::Agent(id)
        }
    }
}

impl From<&str> for Recipient {
    fn from(value: &str) -> Self {
        Recipient::from(value.to_string())
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Agent(id) => write!(f, "{}", id),
            Recipient::Broadcast => f.write_str(BROADCAST),
        }
    }
}

/// A single communication unit between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Globally unique message id
    pub id: String,

    /// Sending agent
    pub from: AgentId,

    /// Receiving agent or the broadcast sentinel
    pub to: Recipient,

    /// Message kind, `type` on the wire
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Opaque structured payload
    pub payload: serde_json::Value,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// Id of the originating request or session
    pub correlation_id: Option<String>,
}

impl AgentMessage {
    /// Build a message with a fresh id and the current time
    pub fn new(
        from: AgentId,
        to: impl Into<Recipient>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from,
            to: to.into(),
            kind,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Build a message tied to an earlier request or session
    pub fn with_correlation(
        from: AgentId,
        to: impl Into<Recipient>,
        kind: MessageKind,
        payload: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            correlation_id,
            ..Self::new(from, to, kind, payload)
        }
    }

    /// Whether this message targets every other agent
    pub fn is_broadcast(&self) -> bool {
        matches!(self.to, Recipient::Broadcast)
    }

    /// The payload's `action` field, if it is a string
    pub fn action(&self) -> Option<&str> {
        self.payload.get("action").and_then(|v| v.as_str())
    }

    /// Wire-shaped JSON value
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
