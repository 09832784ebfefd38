//! Goal-scoped shared blackboard
//!
//! A [`SessionContext`] is created by the coordinator for one goal and bound
//! into every registered agent. Agents run on separate tasks, so every access
//! goes through a single mutex. Read-modify-write sequences must use
//! [`SessionContext::update_with`] to stay atomic.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Shared mutable state for one goal
#[derive(Debug)]
pub struct SessionContext {
    session_id: String,
    goal: String,
    data: Mutex<Map<String, Value>>,
}

impl SessionContext {
    /// Create a session with optional seed data
    pub fn new(session_id: impl Into<String>, goal: impl Into<String>, initial: Option<Map<String, Value>>) -> Self {
        Self {
            session_id: session_id.into(),
            goal: goal.into(),
            data: Mutex::new(initial.unwrap_or_default()),
        }
    }

    /// Convenience constructor returning the shared handle agents bind to
    pub fn shared(session_id: impl Into<String>, goal: impl Into<String>, initial: Option<Map<String, Value>>) -> Arc<Self> {
        Arc::new(Self::new(session_id, goal, initial))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Clone of the value under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    /// Insert or overwrite one key
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data.lock().insert(key.into(), value);
    }

    /// Merge several keys at once
    pub fn update(&self, updates: Map<String, Value>) {
        let mut data = self.data.lock();
        for (key, value) in updates {
            data.insert(key, value);
        }
    }

    /// Remove a key, returning its previous value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.lock().remove(key)
    }

    /// Run `f` with exclusive access to the blackboard
    pub fn update_with<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
        let mut data = self.data.lock();
        f(&mut data)
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> Map<String, Value> {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}
