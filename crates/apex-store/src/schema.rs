// schema.rs — Table layout for the kernel's durable collections.
//
// Eight collections: events, agent_budgets, cost_ledger, quarantine_records,
// rollback_checkpoints, state_transitions, conflict_resolutions and
// actuator_actions. Every table carries an INTEGER `seq` so that insertion
// order is recoverable independently of wall-clock timestamps.
//
// Append-only collections are enforced by triggers rather than by
// convention, so even a hand-written UPDATE against the file is refused.

use rusqlite::Connection;

use crate::error::StoreError;

/// Current schema version, recorded in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS events (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  event_id TEXT NOT NULL UNIQUE,
  event_type TEXT NOT NULL,
  actor TEXT NOT NULL,
  payload TEXT NOT NULL,
  timestamp TEXT NOT NULL,
  previous_event_id TEXT REFERENCES events(event_id),
  previous_hash TEXT,
  event_hash TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type, seq);
CREATE INDEX IF NOT EXISTS idx_events_actor ON events(actor, seq);

CREATE TRIGGER IF NOT EXISTS events_no_update BEFORE UPDATE ON events
BEGIN
  SELECT RAISE(ABORT, 'events are append-only');
END;
CREATE TRIGGER IF NOT EXISTS events_no_delete BEFORE DELETE ON events
BEGIN
  SELECT RAISE(ABORT, 'events are append-only');
END;

CREATE TABLE IF NOT EXISTS agent_budgets (
  agent_id TEXT PRIMARY KEY,
  total_budget REAL NOT NULL CHECK (total_budget >= 0),
  spent_budget REAL NOT NULL DEFAULT 0 CHECK (spent_budget >= 0),
  window_start TEXT NOT NULL,
  window_end TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cost_ledger (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  entry_id TEXT NOT NULL UNIQUE,
  agent_id TEXT NOT NULL,
  action_id TEXT,
  cost_type TEXT NOT NULL,
  cost_amount REAL NOT NULL CHECK (cost_amount >= 0),
  timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cost_ledger_agent ON cost_ledger(agent_id, seq);

CREATE TRIGGER IF NOT EXISTS cost_ledger_no_update BEFORE UPDATE ON cost_ledger
BEGIN
  SELECT RAISE(ABORT, 'cost ledger entries are append-only');
END;
CREATE TRIGGER IF NOT EXISTS cost_ledger_no_delete BEFORE DELETE ON cost_ledger
BEGIN
  SELECT RAISE(ABORT, 'cost ledger entries are append-only');
END;

CREATE TABLE IF NOT EXISTS quarantine_records (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  agent_id TEXT NOT NULL,
  reason TEXT NOT NULL,
  quarantined_at TEXT NOT NULL,
  released_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_quarantine_open
  ON quarantine_records(agent_id) WHERE released_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_quarantine_agent ON quarantine_records(agent_id, seq);

CREATE TABLE IF NOT EXISTS rollback_checkpoints (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  checkpoint_id TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  snapshot TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS rollback_checkpoints_no_update BEFORE UPDATE ON rollback_checkpoints
BEGIN
  SELECT RAISE(ABORT, 'checkpoints are immutable');
END;

CREATE TABLE IF NOT EXISTS state_transitions (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  transition_id TEXT NOT NULL UNIQUE,
  from_state TEXT NOT NULL,
  to_state TEXT NOT NULL,
  trigger_reason TEXT NOT NULL,
  authorized_by TEXT,
  timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_state_transitions_time ON state_transitions(timestamp, seq);

CREATE TABLE IF NOT EXISTS conflict_resolutions (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  resolution_id TEXT NOT NULL UNIQUE,
  conflict_type TEXT NOT NULL,
  conflicting_agents TEXT NOT NULL,
  resolution TEXT NOT NULL,
  resolved_by TEXT NOT NULL,
  timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS actuator_actions (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  action_id TEXT NOT NULL UNIQUE,
  agent_id TEXT NOT NULL,
  action_type TEXT NOT NULL,
  payload TEXT NOT NULL,
  cost REAL NOT NULL,
  status TEXT NOT NULL CHECK (status IN ('pending', 'success', 'failed')),
  result TEXT,
  error TEXT,
  timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_actuator_actions_agent ON actuator_actions(agent_id, seq);
CREATE INDEX IF NOT EXISTS idx_actuator_actions_status ON actuator_actions(status, seq);
";

/// Bring the database up to [`SCHEMA_VERSION`].
///
/// Idempotent: every statement is `IF NOT EXISTS`, and the version pragma
/// is only bumped forward.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current > SCHEMA_VERSION {
        return Err(StoreError::Corrupt {
            collection: "schema",
            detail: format!(
                "database schema version {} is newer than supported version {}",
                current, SCHEMA_VERSION
            ),
        });
    }

    conn.execute_batch(SCHEMA_V1)?;
    if current < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::info!(from = current, to = SCHEMA_VERSION, "store schema migrated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        assert!(matches!(
            migrate(&conn),
            Err(StoreError::Corrupt {
                collection: "schema",
                ..
            })
        ));
    }

    #[test]
    fn events_reject_updates_and_deletes() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO events (event_id, event_type, actor, payload, timestamp, event_hash)
             VALUES ('e1', 'test', 'system', '{}', '2024-01-01 00:00:00+00:00', 'h')",
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE events SET actor = 'mallory' WHERE event_id = 'e1'", [])
            .is_err());
        assert!(conn
            .execute("DELETE FROM events WHERE event_id = 'e1'", [])
            .is_err());
    }

    #[test]
    fn only_one_open_quarantine_per_agent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let insert = "INSERT INTO quarantine_records (agent_id, reason, quarantined_at)
                      VALUES ('agent-1', 'r', '2024-01-01 00:00:00+00:00')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());

        // Closing the open record makes room for a new one.
        conn.execute(
            "UPDATE quarantine_records SET released_at = '2024-01-02 00:00:00+00:00'",
            [],
        )
        .unwrap();
        conn.execute(insert, []).unwrap();
    }
}
