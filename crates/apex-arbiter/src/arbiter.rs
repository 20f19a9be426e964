// arbiter.rs — Arbiter: gates system-wide escalation.
//
// The current state is never held in memory. It is the `to_state` of the
// latest row in `state_transitions` (OBSERVE when there is none), read
// inside the same write transaction that validates and records the next
// transition. Two concurrent requests therefore serialize: the second one
// is checked against the state the first one produced.

use std::sync::Arc;

use apex_audit::{append_in, Event, EventKind};
use apex_store::column::{json_at, to_json, uuid_at};
use apex_store::{Store, StoreError};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

use crate::error::{ArbiterError, Denial};
use crate::record::{ConflictResolution, StateTransition};
use crate::state::{DefendPolicy, SystemState};

/// Actor recorded on a transition nobody signed.
pub const SYSTEM_ACTOR: &str = "system";

/// Handle to the system state machine in a shared store.
///
/// Holds no state of its own; cheap to create per request or per thread.
#[derive(Clone)]
pub struct Arbiter {
    store: Arc<Store>,
    policy: DefendPolicy,
}

impl Arbiter {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            policy: DefendPolicy::default(),
        }
    }

    /// Replace the DEFEND authorization policy.
    pub fn with_policy(mut self, policy: DefendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &DefendPolicy {
        &self.policy
    }

    pub fn current_state(&self) -> Result<SystemState, ArbiterError> {
        Ok(self.store.read(load_current)?)
    }

    /// Move the system to `to_state`.
    ///
    /// Fails with `TransitionDenied` when the edge is not in the table, or
    /// when entering DEFEND without an identity the policy accepts. A denial
    /// writes nothing.
    pub fn request_transition(
        &self,
        to_state: SystemState,
        trigger: &str,
        authorized_by: Option<&str>,
    ) -> Result<StateTransition, ArbiterError> {
        let result = self.store.write(|tx| -> Result<StateTransition, ArbiterError> {
            let from_state = load_current(tx)?;
            if !from_state.can_transition_to(&to_state) {
                return Err(ArbiterError::TransitionDenied {
                    from: from_state,
                    to: to_state,
                    reason: Denial::IllegalTransition,
                });
            }
            if to_state == SystemState::Defend && !self.policy.authorizes(authorized_by) {
                return Err(ArbiterError::TransitionDenied {
                    from: from_state,
                    to: to_state,
                    reason: Denial::Unauthorized {
                        authorized_by: authorized_by.map(str::to_string),
                    },
                });
            }

            append_in(
                tx,
                Event::new(EventKind::StateTransition, authorized_by.unwrap_or(SYSTEM_ACTOR))
                    .with_payload(json!({
                        "from": from_state,
                        "to": to_state,
                        "trigger": trigger,
                    })),
            )?;

            let transition = StateTransition {
                transition_id: Uuid::new_v4(),
                from_state,
                to_state,
                trigger: trigger.to_string(),
                authorized_by: authorized_by.map(str::to_string),
                timestamp: Utc::now(),
            };
            tx.execute(
                "INSERT INTO state_transitions
                   (transition_id, from_state, to_state, trigger_reason, authorized_by, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    transition.transition_id.to_string(),
                    transition.from_state.as_str(),
                    transition.to_state.as_str(),
                    transition.trigger,
                    transition.authorized_by,
                    transition.timestamp,
                ],
            )?;
            Ok(transition)
        });

        match &result {
            Ok(t) => tracing::info!(
                from = %t.from_state,
                to = %t.to_state,
                trigger,
                authorized_by = ?authorized_by,
                "system state changed"
            ),
            Err(ArbiterError::TransitionDenied { from, to, reason }) => tracing::warn!(
                %from,
                %to,
                %reason,
                "state transition denied"
            ),
            Err(_) => {}
        }
        result
    }

    /// Record how a conflict between agents was settled. Changes no state.
    pub fn resolve_conflict(
        &self,
        conflict_type: &str,
        conflicting_agents: &[String],
        resolution: &str,
        resolved_by: &str,
    ) -> Result<Uuid, ArbiterError> {
        let record = ConflictResolution {
            resolution_id: Uuid::new_v4(),
            conflict_type: conflict_type.to_string(),
            conflicting_agents: conflicting_agents.to_vec(),
            resolution: resolution.to_string(),
            resolved_by: resolved_by.to_string(),
            timestamp: Utc::now(),
        };

        self.store.write(|tx| -> Result<(), ArbiterError> {
            append_in(
                tx,
                Event::new(EventKind::ConflictResolution, resolved_by).with_payload(json!({
                    "conflict_type": conflict_type,
                    "agents": conflicting_agents,
                    "resolution": resolution,
                })),
            )?;
            tx.execute(
                "INSERT INTO conflict_resolutions
                   (resolution_id, conflict_type, conflicting_agents, resolution, resolved_by, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.resolution_id.to_string(),
                    record.conflict_type,
                    to_json(&json!(record.conflicting_agents))?,
                    record.resolution,
                    record.resolved_by,
                    record.timestamp,
                ],
            )?;
            Ok(())
        })?;

        tracing::info!(conflict_type, resolved_by, "conflict resolved");
        Ok(record.resolution_id)
    }

    /// Up to `limit` transitions, newest first.
    pub fn history(&self, limit: usize) -> Result<Vec<StateTransition>, ArbiterError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let transitions = self.store.read(|conn| -> Result<Vec<StateTransition>, StoreError> {
            let mut stmt = conn.prepare(
                "SELECT transition_id, from_state, to_state, trigger_reason, authorized_by, timestamp
                 FROM state_transitions ORDER BY timestamp DESC, seq DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], map_transition)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        Ok(transitions)
    }

    /// Up to `limit` conflict resolutions, newest first.
    pub fn conflicts(&self, limit: usize) -> Result<Vec<ConflictResolution>, ArbiterError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = self.store.read(|conn| -> Result<Vec<ConflictResolution>, StoreError> {
            let mut stmt = conn.prepare(
                "SELECT resolution_id, conflict_type, conflicting_agents, resolution, resolved_by, timestamp
                 FROM conflict_resolutions ORDER BY timestamp DESC, seq DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], map_conflict)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        Ok(records)
    }
}

fn load_current(conn: &Connection) -> Result<SystemState, StoreError> {
    let latest = conn
        .query_row(
            "SELECT to_state FROM state_transitions ORDER BY timestamp DESC, seq DESC LIMIT 1",
            [],
            |row| state_at(row, 0),
        )
        .optional()?;
    Ok(latest.unwrap_or_default())
}

fn state_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<SystemState> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_transition(row: &Row<'_>) -> rusqlite::Result<StateTransition> {
    Ok(StateTransition {
        transition_id: uuid_at(row, 0)?,
        from_state: state_at(row, 1)?,
        to_state: state_at(row, 2)?,
        trigger: row.get(3)?,
        authorized_by: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn map_conflict(row: &Row<'_>) -> rusqlite::Result<ConflictResolution> {
    let agents = json_at(row, 2)?;
    let conflicting_agents = serde_json::from_value(agents)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(ConflictResolution {
        resolution_id: uuid_at(row, 0)?,
        conflict_type: row.get(1)?,
        conflicting_agents,
        resolution: row.get(3)?,
        resolved_by: row.get(4)?,
        timestamp: row.get(5)?,
    })
}
