// budget.rs — Budget window and cost ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The active budget allocation for one agent.
///
/// `spent_budget` only grows between allocations; a fresh allocation
/// replaces the whole record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentBudget {
    pub agent_id: String,
    pub total_budget: f64,
    pub spent_budget: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl AgentBudget {
    /// Whether the window is still open at `now` (the end is inclusive).
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.window_end
    }

    /// Spendable budget at `now`: zero once the window has closed.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> f64 {
        if self.is_active_at(now) {
            self.total_budget - self.spent_budget
        } else {
            0.0
        }
    }

    /// Whether a charge of `cost` would be accepted at `now`.
    pub fn can_cover(&self, cost: f64, now: DateTime<Utc>) -> bool {
        self.is_active_at(now) && self.total_budget - self.spent_budget >= cost
    }
}

/// One committed charge. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostLedgerEntry {
    pub entry_id: Uuid,
    pub agent_id: String,
    /// The actuator action that incurred this cost, if any.
    pub action_id: Option<Uuid>,
    /// Free-form cost category, e.g. "compute" or "api_call".
    pub cost_type: String,
    pub cost_amount: f64,
    pub timestamp: DateTime<Utc>,
}
