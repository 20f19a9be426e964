// action.rs — ActuatorAction: the durable record of one agent action.
//
// Created `pending` right after the initiation event is logged, then moved
// exactly once to `success` or `failed`. A row left `pending` means the
// process died between charging and finishing; reconciling it is an
// operator task (see `Kernel::pending_actions`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Success,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Success => "success",
            ActionStatus::Failed => "failed",
        }
    }

    /// Parse the stored column value.
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ActionStatus::Pending),
            "success" => Some(ActionStatus::Success),
            "failed" => Some(ActionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActuatorAction {
    pub action_id: Uuid,
    pub agent_id: String,
    pub action_type: String,
    pub payload: serde_json::Value,
    pub cost: f64,
    pub status: ActionStatus,
    /// Executor output, set on success.
    pub result: Option<serde_json::Value>,
    /// Failure description, set when the charge or the executor failed.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_column_round_trip() {
        for status in [ActionStatus::Pending, ActionStatus::Success, ActionStatus::Failed] {
            assert_eq!(ActionStatus::from_db(status.as_str()), Some(status));
        }
        assert_eq!(ActionStatus::from_db("running"), None);
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
    }
}
