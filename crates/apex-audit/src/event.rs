// event.rs — Event data model.
//
// Every decision point in the kernel (budget allocation, charge,
// quarantine, state transition, action start and completion) is recorded
// as an Event. Events are linked two ways:
// - `previous_event_id`: an optional causal link supplied by the writer,
//   e.g. an action's completion event points at its initiation event.
// - `previous_hash`: set by the log on append, chaining every event to the
//   one before it in global order for tamper detection.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of decision an event records.
///
/// Kernel components use the named variants. External collaborators may
/// log their own kinds through `Other`; the log never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    StateTransition,
    ConflictResolution,
    BudgetAllocated,
    CostCharged,
    AgentQuarantined,
    AgentReleased,
    AgentTerminated,
    CheckpointCreated,
    SystemRollback,
    AgentActionInitiated,
    AgentActionCompleted,
    EscalationRequest,
    Other(String),
}

impl EventKind {
    /// The stored snake_case name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::StateTransition => "state_transition",
            EventKind::ConflictResolution => "conflict_resolution",
            EventKind::BudgetAllocated => "budget_allocated",
            EventKind::CostCharged => "cost_charged",
            EventKind::AgentQuarantined => "agent_quarantined",
            EventKind::AgentReleased => "agent_released",
            EventKind::AgentTerminated => "agent_terminated",
            EventKind::CheckpointCreated => "checkpoint_created",
            EventKind::SystemRollback => "system_rollback",
            EventKind::AgentActionInitiated => "agent_action_initiated",
            EventKind::AgentActionCompleted => "agent_action_completed",
            EventKind::EscalationRequest => "escalation_request",
            EventKind::Other(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "state_transition" => EventKind::StateTransition,
            "conflict_resolution" => EventKind::ConflictResolution,
            "budget_allocated" => EventKind::BudgetAllocated,
            "cost_charged" => EventKind::CostCharged,
            "agent_quarantined" => EventKind::AgentQuarantined,
            "agent_released" => EventKind::AgentReleased,
            "agent_terminated" => EventKind::AgentTerminated,
            "checkpoint_created" => EventKind::CheckpointCreated,
            "system_rollback" => EventKind::SystemRollback,
            "agent_action_initiated" => EventKind::AgentActionInitiated,
            "agent_action_completed" => EventKind::AgentActionCompleted,
            "escalation_request" => EventKind::EscalationRequest,
            _ => EventKind::Other(name),
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        EventKind::from(name.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable provenance record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Unique identifier for this event.
    pub event_id: Uuid,

    /// What kind of decision this event records.
    pub event_type: EventKind,

    /// Who made the decision: an agent id, a component name
    /// (`metabolism`, `immune_system`) or a `<role>:<subject>` identity.
    pub actor: String,

    /// Opaque payload. The log never validates its shape.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// When this event occurred (UTC).
    pub timestamp: DateTime<Utc>,

    /// Causal predecessor supplied by the writer.
    pub previous_event_id: Option<Uuid>,

    /// Hash of the preceding event in log order. Set by the log on append;
    /// `None` only for the very first event.
    pub previous_hash: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp and a random UUID.
    pub fn new(kind: impl Into<EventKind>, actor: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: kind.into(),
            actor: actor.into(),
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
            previous_event_id: None,
            previous_hash: None,
        }
    }

    /// Set the payload and return self.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Link this event to its causal predecessor and return self.
    pub fn with_previous(mut self, previous_event_id: Uuid) -> Self {
        self.previous_event_id = Some(previous_event_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&EventKind::AgentActionCompleted).unwrap();
        assert_eq!(json, "\"agent_action_completed\"");
    }

    #[test]
    fn unknown_kinds_survive_as_other() {
        let kind: EventKind = serde_json::from_str("\"sensor_read\"").unwrap();
        assert_eq!(kind, EventKind::Other("sensor_read".into()));
        assert_eq!(kind.to_string(), "sensor_read");
    }

    #[test]
    fn known_names_parse_to_named_variants() {
        assert_eq!(EventKind::from("cost_charged"), EventKind::CostCharged);
        assert_eq!(
            EventKind::from(EventKind::EscalationRequest.as_str()),
            EventKind::EscalationRequest
        );
    }

    #[test]
    fn builder_sets_link_and_payload() {
        let parent = Uuid::new_v4();
        let event = Event::new(EventKind::AgentActionCompleted, "agent-1")
            .with_payload(serde_json::json!({"status": "success"}))
            .with_previous(parent);
        assert_eq!(event.previous_event_id, Some(parent));
        assert_eq!(event.payload["status"], "success");
        assert!(event.previous_hash.is_none());
    }

    #[test]
    fn event_ids_are_unique() {
        let e1 = Event::new(EventKind::CostCharged, "metabolism");
        let e2 = Event::new(EventKind::CostCharged, "metabolism");
        assert_ne!(e1.event_id, e2.event_id);
    }
}
