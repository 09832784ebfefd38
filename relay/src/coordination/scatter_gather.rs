//! Scatter/gather join
//!
//! A goal is fanned out into one request per responder, all tagged with the
//! same correlation id. [`ScatterGather`] tracks who is still outstanding and
//! reports completion exactly once, the first time the pending set empties.
//! Late, duplicate and unexpected responses are reported as ignored rather
//! than treated as errors.

use crate::agents::AgentId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::fmt;

/// Phase of one scatter/gather instance. A session without an instance is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatherPhase {
    /// Requests sent, replies outstanding
    Waiting,

    /// All replies collected and the next stage triggered
    Advancing,
}

impl GatherPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatherPhase::Waiting => "waiting",
            GatherPhase::Advancing => "advancing",
        }
    }
}

impl fmt::Display for GatherPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a response did not change the join state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Sender was never pending or already answered
    NotPending,

    /// The join already completed
    AlreadyAdvanced,
}

/// Result of recording one response
#[derive(Debug, Clone, PartialEq)]
pub enum GatherOutcome {
    /// Stored; `remaining` responders still outstanding
    Recorded { remaining: usize },

    /// Last outstanding response arrived; every collected payload in arrival order
    Complete(Vec<(AgentId, Value)>),

    Ignored(IgnoreReason),
}

/// Join state for one fan-out
#[derive(Debug, Clone)]
pub struct ScatterGather {
    correlation_id: String,
    pending: HashSet<AgentId>,
    collected: Vec<(AgentId, Value)>,
    phase: GatherPhase,
}

impl ScatterGather {
    /// Start waiting on `responders`
    pub fn new(correlation_id: impl Into<String>, responders: impl IntoIterator<Item = AgentId>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            pending: responders.into_iter().collect(),
            collected: Vec::new(),
            phase: GatherPhase::Waiting,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn phase(&self) -> GatherPhase {
        self.phase
    }

    pub fn is_pending(&self, responder: &AgentId) -> bool {
        self.pending.contains(responder)
    }

    /// Outstanding responders, sorted for stable display
    pub fn pending(&self) -> Vec<AgentId> {
        let mut pending: Vec<_> = self.pending.iter().cloned().collect();
        pending.sort();
        pending
    }

    pub fn collected(&self) -> &[(AgentId, Value)] {
        &self.collected
    }

    /// Record a response from `from`.
    ///
    /// Removal from the pending set and the emptiness check happen in one
    /// `&mut self` call, so completion cannot be observed twice or missed.
    pub fn record(&mut self, from: &AgentId, payload: Value) -> GatherOutcome {
        if self.phase == GatherPhase::Advancing {
            return GatherOutcome::Ignored(IgnoreReason::AlreadyAdvanced);
        }

        if !self.pending.remove(from) {
            return GatherOutcome::Ignored(IgnoreReason::NotPending);
        }

        self.collected.push((from.clone(), payload));

        match self.try_advance() {
            Some(collected) => GatherOutcome::Complete(collected),
            None => GatherOutcome::Recorded {
                remaining: self.pending.len(),
            },
        }
    }

    /// Move to [`GatherPhase::Advancing`] if nothing is outstanding.
    ///
    /// Returns the collected payloads on the transition only. Used directly
    /// when a plan fans out to nobody.
    pub fn try_advance(&mut self) -> Option<Vec<(AgentId, Value)>> {
        if self.phase == GatherPhase::Waiting && self.pending.is_empty() {
            self.phase = GatherPhase::Advancing;
            Some(self.collected.clone())
        } else {
            None
        }
    }
}

/// One request of a fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedRequest {
    pub to: AgentId,
    pub payload: Value,
}

/// Agent and action of the stage that follows a completed join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextStage {
    pub to: AgentId,
    pub action: String,
}

/// The decomposer's fixed set of requests and the stage that follows them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutPlan {
    pub requests: Vec<PlannedRequest>,
    pub next_stage: NextStage,
}

impl FanOutPlan {
    /// Distinct responders, in plan order
    pub fn responders(&self) -> Vec<AgentId> {
        let mut seen = HashSet::new();
        self.requests
            .iter()
            .filter(|r| seen.insert(r.to.clone()))
            .map(|r| r.to.clone())
            .collect()
    }

    /// Payload of the consolidated next-stage request:
    /// `{action, "<responder>_data": <response>, ...}`
    pub fn consolidated_payload(&self, collected: &[(AgentId, Value)]) -> Value {
        let mut payload = Map::new();
        payload.insert("action".to_string(), Value::String(self.next_stage.action.clone()));
        for (from, response) in collected {
            payload.insert(data_key(from), response.clone());
        }
        Value::Object(payload)
    }
}

impl Default for FanOutPlan {
    fn default() -> Self {
        Self {
            requests: vec![
                PlannedRequest {
                    to: AgentId::from("weather"),
                    payload: json!({
                        "action": "get_forecast",
                        "origin": "PTY",
                        "destination": "BOG",
                        "time_range": "next_24_hours"
                    }),
                },
                PlannedRequest {
                    to: AgentId::from("fuel"),
                    payload: json!({
                        "action": "get_fuel_analysis",
                        "origin": "PTY",
                        "destination": "BOG"
                    }),
                },
                PlannedRequest {
                    to: AgentId::from("network"),
                    payload: json!({
                        "action": "check_constraints",
                        "route": "PTY-BOG"
                    }),
                },
            ],
            next_stage: NextStage {
                to: AgentId::from("optimizer"),
                action: "optimize_route".to_string(),
            },
        }
    }
}

/// Blackboard key under which a responder's payload is stored
pub fn data_key(responder: &AgentId) -> String {
    format!("{}_data", responder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::from(*n)).collect()
    }

    #[test]
    fn test_completes_once_after_all_responders() {
        let mut join = ScatterGather::new("s-1", ids(&["x", "y", "z"]));

        assert_eq!(
            join.record(&"y".into(), json!(2)),
            GatherOutcome::Recorded { remaining: 2 }
        );
        assert_eq!(
            join.record(&"x".into(), json!(1)),
            GatherOutcome::Recorded { remaining: 1 }
        );
        match join.record(&"z".into(), json!(3)) {
            GatherOutcome::Complete(collected) => {
                let order: Vec<_> = collected.iter().map(|(id, _)| id.to_string()).collect();
                assert_eq!(order, vec!["y", "x", "z"]);
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(join.phase(), GatherPhase::Advancing);

        assert_eq!(
            join.record(&"z".into(), json!(3)),
            GatherOutcome::Ignored(IgnoreReason::AlreadyAdvanced)
        );
    }

    #[test]
    fn test_duplicates_and_strangers_are_ignored() {
        let mut join = ScatterGather::new("s-1", ids(&["x", "y"]));

        join.record(&"x".into(), json!(1));
        assert_eq!(
            join.record(&"x".into(), json!("again")),
            GatherOutcome::Ignored(IgnoreReason::NotPending)
        );
        assert_eq!(
            join.record(&"intruder".into(), json!(0)),
            GatherOutcome::Ignored(IgnoreReason::NotPending)
        );
        assert_eq!(join.pending(), ids(&["y"]));
        assert_eq!(join.collected().len(), 1);
        assert_eq!(join.collected()[0].1, json!(1));
    }

    #[test]
    fn test_empty_fan_out_advances_immediately() {
        let mut join = ScatterGather::new("s-1", Vec::new());
        assert_eq!(join.try_advance(), Some(Vec::new()));
        assert_eq!(join.try_advance(), None);
    }

    #[test]
    fn test_try_advance_waits_for_pending() {
        let mut join = ScatterGather::new("s-1", ids(&["x"]));
        assert_eq!(join.try_advance(), None);
        assert_eq!(join.phase(), GatherPhase::Waiting);
    }

    #[test]
    fn test_default_plan() {
        let plan = FanOutPlan::default();
        assert_eq!(plan.responders(), ids(&["weather", "fuel", "network"]));
        assert_eq!(plan.next_stage.to, AgentId::from("optimizer"));
    }

    #[test]
    fn test_responders_are_distinct() {
        let mut plan = FanOutPlan::default();
        plan.requests.push(PlannedRequest {
            to: AgentId::from("fuel"),
            payload: json!({"action": "second_opinion"}),
        });
        assert_eq!(plan.responders().len(), 3);
    }

    #[test]
    fn test_consolidated_payload() {
        let plan = FanOutPlan::default();
        let payload = plan.consolidated_payload(&[
            (AgentId::from("weather"), json!({"confidence": 0.85})),
            (AgentId::from("fuel"), json!({"tankering_savings": 450})),
        ]);

        assert_eq!(payload["action"], "optimize_route");
        assert_eq!(payload["weather_data"]["confidence"], 0.85);
        assert_eq!(payload["fuel_data"]["tankering_savings"], 450);
    }

    proptest! {
        #[test]
        fn prop_any_ordering_completes_exactly_once(
            order in Just(vec![0usize, 1, 2]).prop_shuffle(),
            duplicates in proptest::collection::vec(0usize..3, 0..6),
        ) {
            let names = ["x", "y", "z"];
            let mut join = ScatterGather::new("s", ids(&names));

            // Interleave duplicates after the first response of each sender.
            let mut deliveries: Vec<usize> = Vec::new();
            for (i, sender) in order.iter().enumerate() {
                deliveries.push(*sender);
                if let Some(dup) = duplicates.get(i) {
                    if order[..=i].contains(dup) {
                        deliveries.push(*dup);
                    }
                }
            }
            deliveries.extend(duplicates.iter().copied());

            let mut completions = 0;
            let mut answered = HashSet::new();
            for sender in deliveries {
                answered.insert(sender);
                if let GatherOutcome::Complete(collected) = join.record(&names[sender].into(), json!(sender)) {
                    completions += 1;
                    prop_assert_eq!(answered.len(), 3);
                    prop_assert_eq!(collected.len(), 3);
                }
            }

            prop_assert_eq!(completions, 1);
            prop_assert_eq!(join.phase(), GatherPhase::Advancing);
        }
    }
}
