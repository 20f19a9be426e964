// record.rs — Quarantine records and rollback checkpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One quarantine episode for an agent.
///
/// An agent has at most one open record (`released_at == None`) at a time.
/// Quarantining an already-quarantined agent appends to `reason` rather
/// than opening a second record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuarantineRecord {
    pub agent_id: String,
    /// All reasons for this episode, joined with `"; "`.
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl QuarantineRecord {
    pub fn is_open(&self) -> bool {
        self.released_at.is_none()
    }

    /// The individual reasons in the order they were recorded.
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.reason.split("; ")
    }
}

/// A named, immutable snapshot of system state.
///
/// The snapshot is opaque to the kernel: it is stored and handed back on
/// rollback, never interpreted or applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackCheckpoint {
    pub checkpoint_id: Uuid,
    pub name: String,
    pub state_snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
