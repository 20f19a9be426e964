// guard.rs — ImmuneSystem: quarantine, release, checkpoints and apoptosis.
//
// Quarantine is the kernel's only automatic recovery action. It is
// absolute: while an agent has an open record, the kernel refuses every
// action it requests, and its remaining budget has been forfeited.
//
// Open-or-append runs inside one write transaction, backed by a partial
// unique index that allows a single open record per agent, so two
// concurrent quarantines of the same agent always end up as one record
// holding both reasons.

use std::sync::Arc;

use apex_audit::{append_in, Event, EventKind};
use apex_metabolism::revoke_remaining_in;
use apex_store::column::{json_at, to_json, uuid_at};
use apex_store::{Store, StoreError};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

use crate::error::ImmuneError;
use crate::record::{QuarantineRecord, RollbackCheckpoint};

/// Actor name recorded on events this component writes.
pub const ACTOR: &str = "immune_system";

/// Prefix marking a quarantine reason as a termination.
pub const TERMINATED_PREFIX: &str = "TERMINATED: ";

const QUARANTINE_COLUMNS: &str = "agent_id, reason, quarantined_at, released_at";
const CHECKPOINT_COLUMNS: &str = "checkpoint_id, name, snapshot, created_at";

/// Handle to quarantine and checkpoint state in a shared store.
#[derive(Clone)]
pub struct ImmuneSystem {
    store: Arc<Store>,
}

impl ImmuneSystem {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Quarantine an agent and forfeit its remaining budget.
    ///
    /// If the agent is already quarantined, `reason` is appended to the open
    /// record. Either way the budget is zeroed again and an
    /// `agent_quarantined` event is recorded.
    pub fn quarantine_agent(
        &self,
        agent_id: &str,
        reason: &str,
    ) -> Result<QuarantineRecord, ImmuneError> {
        let (record, _) = self.store.write(|tx| quarantine_in(tx, agent_id, reason))?;
        Ok(record)
    }

    /// Close the agent's open quarantine record.
    ///
    /// The forfeited budget is not restored; the agent needs a fresh
    /// allocation before it can act again.
    pub fn release_agent(
        &self,
        agent_id: &str,
        released_by: &str,
    ) -> Result<QuarantineRecord, ImmuneError> {
        let record = self.store.write(|tx| -> Result<QuarantineRecord, ImmuneError> {
            let mut record = load_open(tx, agent_id)?.ok_or_else(|| {
                ImmuneError::NotQuarantined {
                    agent_id: agent_id.to_string(),
                }
            })?;
            let now = Utc::now();
            tx.execute(
                "UPDATE quarantine_records SET released_at = ?2
                 WHERE agent_id = ?1 AND released_at IS NULL",
                params![agent_id, now],
            )?;
            record.released_at = Some(now);

            append_in(
                tx,
                Event::new(EventKind::AgentReleased, released_by).with_payload(json!({
                    "agent_id": agent_id,
                    "quarantine_reason": record.reason,
                })),
            )?;
            Ok(record)
        })?;

        tracing::info!(agent_id, released_by, "agent released from quarantine");
        Ok(record)
    }

    /// True iff the agent has an open quarantine record.
    pub fn is_quarantined(&self, agent_id: &str) -> Result<bool, ImmuneError> {
        Ok(self.quarantine_record(agent_id)?.is_some())
    }

    /// The agent's open quarantine record, if any.
    pub fn quarantine_record(&self, agent_id: &str) -> Result<Option<QuarantineRecord>, ImmuneError> {
        Ok(self.store.read(|conn| load_open(conn, agent_id))?)
    }

    /// Every quarantine episode for the agent, oldest first.
    pub fn quarantine_history(&self, agent_id: &str) -> Result<Vec<QuarantineRecord>, ImmuneError> {
        let records = self.store.read(|conn| -> Result<Vec<QuarantineRecord>, StoreError> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {QUARANTINE_COLUMNS} FROM quarantine_records
                 WHERE agent_id = ?1 ORDER BY seq ASC"
            ))?;
            let rows = stmt.query_map([agent_id], map_quarantine)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        Ok(records)
    }

    /// Store an opaque snapshot and return its id.
    pub fn create_checkpoint(
        &self,
        name: &str,
        state_snapshot: serde_json::Value,
    ) -> Result<Uuid, ImmuneError> {
        let checkpoint_id = Uuid::new_v4();
        self.store.write(|tx| -> Result<(), ImmuneError> {
            tx.execute(
                "INSERT INTO rollback_checkpoints (checkpoint_id, name, snapshot, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    checkpoint_id.to_string(),
                    name,
                    to_json(&state_snapshot)?,
                    Utc::now()
                ],
            )?;
            append_in(
                tx,
                Event::new(EventKind::CheckpointCreated, ACTOR).with_payload(json!({
                    "checkpoint_id": checkpoint_id,
                    "checkpoint_name": name,
                })),
            )?;
            Ok(())
        })?;

        tracing::info!(%checkpoint_id, name, "checkpoint created");
        Ok(checkpoint_id)
    }

    /// Record a rollback to `checkpoint_id` and return its snapshot.
    ///
    /// Applying the snapshot is the caller's job; the kernel only audits
    /// who asked for it.
    pub fn rollback_to_checkpoint(
        &self,
        checkpoint_id: Uuid,
        authorized_by: &str,
    ) -> Result<serde_json::Value, ImmuneError> {
        let checkpoint = self.store.write(|tx| -> Result<RollbackCheckpoint, ImmuneError> {
            let checkpoint = load_checkpoint(tx, checkpoint_id)?
                .ok_or(ImmuneError::CheckpointNotFound(checkpoint_id))?;
            append_in(
                tx,
                Event::new(EventKind::SystemRollback, authorized_by).with_payload(json!({
                    "checkpoint_id": checkpoint_id,
                    "checkpoint_name": checkpoint.name,
                })),
            )?;
            Ok(checkpoint)
        })?;

        tracing::warn!(%checkpoint_id, name = %checkpoint.name, authorized_by, "system rollback requested");
        Ok(checkpoint.state_snapshot)
    }

    /// All checkpoints, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<RollbackCheckpoint>, ImmuneError> {
        let checkpoints = self.store.read(|conn| -> Result<Vec<RollbackCheckpoint>, StoreError> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHECKPOINT_COLUMNS} FROM rollback_checkpoints ORDER BY seq ASC"
            ))?;
            let rows = stmt.query_map([], map_checkpoint)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        Ok(checkpoints)
    }

    /// Terminate an agent: quarantine it with a `TERMINATED:` reason and
    /// record an `agent_terminated` event. History is kept.
    pub fn apoptosis(&self, agent_id: &str, reason: &str) -> Result<QuarantineRecord, ImmuneError> {
        let record = self.store.write(|tx| -> Result<QuarantineRecord, ImmuneError> {
            let (record, quarantined) =
                quarantine_in(tx, agent_id, &format!("{TERMINATED_PREFIX}{reason}"))?;
            append_in(
                tx,
                Event::new(EventKind::AgentTerminated, ACTOR)
                    .with_payload(json!({ "agent_id": agent_id, "reason": reason }))
                    .with_previous(quarantined.event_id),
            )?;
            Ok(record)
        })?;

        tracing::warn!(agent_id, reason, "agent terminated");
        Ok(record)
    }
}

/// Open-or-append the agent's quarantine record, zero its budget and log
/// `agent_quarantined`. Returns the open record and the logged event.
fn quarantine_in(
    conn: &Connection,
    agent_id: &str,
    reason: &str,
) -> Result<(QuarantineRecord, Event), StoreError> {
    let appended = conn.execute(
        "UPDATE quarantine_records SET reason = reason || '; ' || ?2
         WHERE agent_id = ?1 AND released_at IS NULL",
        params![agent_id, reason],
    )?;
    if appended == 0 {
        conn.execute(
            "INSERT INTO quarantine_records (agent_id, reason, quarantined_at)
             VALUES (?1, ?2, ?3)",
            params![agent_id, reason, Utc::now()],
        )?;
    }

    let forfeited = revoke_remaining_in(conn, agent_id)?;
    let event = append_in(
        conn,
        Event::new(EventKind::AgentQuarantined, ACTOR).with_payload(json!({
            "agent_id": agent_id,
            "reason": reason,
            "forfeited_budget": forfeited,
        })),
    )?;

    let record = load_open(conn, agent_id)?.ok_or_else(|| StoreError::Corrupt {
        collection: "quarantine_records",
        detail: format!("open record for '{agent_id}' vanished inside its own transaction"),
    })?;

    tracing::warn!(agent_id, reason, forfeited_budget = ?forfeited, "agent quarantined");
    Ok((record, event))
}

fn load_open(conn: &Connection, agent_id: &str) -> Result<Option<QuarantineRecord>, StoreError> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {QUARANTINE_COLUMNS} FROM quarantine_records
                 WHERE agent_id = ?1 AND released_at IS NULL"
            ),
            [agent_id],
            map_quarantine,
        )
        .optional()?)
}

fn load_checkpoint(
    conn: &Connection,
    checkpoint_id: Uuid,
) -> Result<Option<RollbackCheckpoint>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {CHECKPOINT_COLUMNS} FROM rollback_checkpoints WHERE checkpoint_id = ?1"),
            [checkpoint_id.to_string()],
            map_checkpoint,
        )
        .optional()?)
}

fn map_quarantine(row: &Row<'_>) -> rusqlite::Result<QuarantineRecord> {
    Ok(QuarantineRecord {
        agent_id: row.get(0)?,
        reason: row.get(1)?,
        quarantined_at: row.get(2)?,
        released_at: row.get(3)?,
    })
}

fn map_checkpoint(row: &Row<'_>) -> rusqlite::Result<RollbackCheckpoint> {
    Ok(RollbackCheckpoint {
        checkpoint_id: uuid_at(row, 0)?,
        name: row.get(1)?,
        state_snapshot: json_at(row, 2)?,
        created_at: row.get(3)?,
    })
}
