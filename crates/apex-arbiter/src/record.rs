// record.rs — Audit records written by the arbiter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::SystemState;

/// One accepted state change. The latest one defines the current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub transition_id: Uuid,
    pub from_state: SystemState,
    pub to_state: SystemState,
    /// What prompted the change, e.g. "anomaly in sensor feed".
    pub trigger: String,
    pub authorized_by: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A recorded human decision between disagreeing agents. Changes no state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictResolution {
    pub resolution_id: Uuid,
    pub conflict_type: String,
    pub conflicting_agents: Vec<String>,
    pub resolution: String,
    pub resolved_by: String,
    pub timestamp: DateTime<Utc>,
}
