// log.rs — EventLog: the append-only provenance log.
//
// Events live in the `events` table of the shared store. The table refuses
// UPDATE and DELETE, and each row carries the hash of the row before it,
// so both accidental and deliberate rewrites are detectable.
//
// Other components record events inside their own write transactions via
// `append_in()`, so the event commits (or rolls back) together with the
// state change it describes. `EventLog::append()` is the standalone form.
//
// Nothing in the kernel reads the log to make an enforcement decision; the
// query methods here exist for diagnostics and operator tooling.

use std::sync::Arc;

use apex_store::column::{json_at, opt_uuid_at, to_json, uuid_at};
use apex_store::{Store, StoreError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::AuditError;
use crate::event::{Event, EventKind};
use crate::hasher;

const EVENT_COLUMNS: &str =
    "event_id, event_type, actor, payload, timestamp, previous_event_id, previous_hash";

/// Selects events by kind and/or actor. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventKind>,
    pub actor: Option<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<EventKind>) -> Self {
        self.event_type = Some(kind.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Append `event` to the log inside an already-open transaction.
///
/// Sets `previous_hash` to the hash of the current last event. Callers hold
/// the store's write transaction, so no other append can slip in between
/// reading the tail and inserting.
pub fn append_in(conn: &Connection, mut event: Event) -> Result<Event, StoreError> {
    event.previous_hash = conn
        .query_row(
            "SELECT event_hash FROM events ORDER BY seq DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let event_hash = hasher::hash_event(&event)?;
    conn.execute(
        "INSERT INTO events
           (event_id, event_type, actor, payload, timestamp, previous_event_id,
            previous_hash, event_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.event_id.to_string(),
            event.event_type.as_str(),
            event.actor,
            to_json(&event.payload)?,
            event.timestamp,
            event.previous_event_id.map(|id| id.to_string()),
            event.previous_hash,
            event_hash,
        ],
    )?;

    tracing::debug!(
        event_id = %event.event_id,
        event_type = %event.event_type,
        actor = %event.actor,
        "event appended"
    );
    Ok(event)
}

/// Handle to the event log in a shared store.
#[derive(Clone)]
pub struct EventLog {
    store: Arc<Store>,
}

impl EventLog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Append an event in its own transaction and return it as stored.
    pub fn append(&self, event: Event) -> Result<Event, AuditError> {
        Ok(self.store.write(|tx| append_in(tx, event))?)
    }

    /// Fetch one event by id.
    pub fn get(&self, event_id: Uuid) -> Result<Option<Event>, AuditError> {
        Ok(self.store.read(|conn| load_event(conn, event_id))?)
    }

    /// The most recent event matching `filter`.
    pub fn latest(&self, filter: &EventFilter) -> Result<Option<Event>, AuditError> {
        Ok(self.find(filter, 1)?.pop())
    }

    /// Up to `limit` events matching `filter`, newest first.
    pub fn find(&self, filter: &EventFilter, limit: usize) -> Result<Vec<Event>, AuditError> {
        let kind = filter.event_type.as_ref().map(|k| k.as_str().to_string());
        let actor = filter.actor.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let events = self.store.read(|conn| -> Result<Vec<Event>, StoreError> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE (?1 IS NULL OR event_type = ?1) AND (?2 IS NULL OR actor = ?2)
                 ORDER BY seq DESC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![kind, actor, limit], map_event)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        Ok(events)
    }

    /// The last `n` events in log order (oldest first).
    pub fn recent(&self, n: usize) -> Result<Vec<Event>, AuditError> {
        let mut events = self.find(&EventFilter::new(), n)?;
        events.reverse();
        Ok(events)
    }

    /// Follow `previous_event_id` links from `event_id` back to the root.
    ///
    /// Returns the starting event first. Links can only point at events
    /// that were already committed, so the walk always terminates.
    pub fn chain_from(&self, event_id: Uuid) -> Result<Vec<Event>, AuditError> {
        let mut chain = Vec::new();
        let mut next = Some(event_id);
        while let Some(id) = next {
            let event = self.get(id)?.ok_or(AuditError::NotFound(id))?;
            next = event.previous_event_id;
            chain.push(event);
        }
        Ok(chain)
    }

    /// Total number of events in the log.
    pub fn len(&self) -> Result<usize, AuditError> {
        let count: i64 = self.store.read(|conn| -> Result<i64, StoreError> {
            Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?)
        })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }

    /// Verify the hash chain across the whole log.
    ///
    /// Recomputes every event's hash and checks each `previous_hash`
    /// against the hash of the row before it. Returns the number of events
    /// verified, or `IntegrityViolation` at the first broken link.
    pub fn verify_chain(&self) -> Result<usize, AuditError> {
        let rows = self
            .store
            .read(|conn| -> Result<Vec<(i64, Event, String)>, StoreError> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS}, seq, event_hash FROM events ORDER BY seq ASC"
                ))?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get(7)?, map_event(row)?, row.get(8)?))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })?;

        let mut previous_hash: Option<String> = None;
        for (seq, event, stored_hash) in &rows {
            if event.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    seq: *seq,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: event
                        .previous_hash
                        .clone()
                        .unwrap_or_else(|| "None".to_string()),
                });
            }

            let recomputed = hasher::hash_event(event).map_err(StoreError::from)?;
            if &recomputed != stored_hash {
                return Err(AuditError::IntegrityViolation {
                    seq: *seq,
                    expected: stored_hash.clone(),
                    actual: recomputed,
                });
            }
            previous_hash = Some(recomputed);
        }

        Ok(rows.len())
    }
}

fn load_event(conn: &Connection, event_id: Uuid) -> Result<Option<Event>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1"),
            [event_id.to_string()],
            map_event,
        )
        .optional()?)
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let kind: String = row.get(1)?;
    Ok(Event {
        event_id: uuid_at(row, 0)?,
        event_type: EventKind::from(kind),
        actor: row.get(2)?,
        payload: json_at(row, 3)?,
        timestamp: row.get(4)?,
        previous_event_id: opt_uuid_at(row, 5)?,
        previous_hash: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log() -> EventLog {
        EventLog::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    #[test]
    fn append_and_get_round_trip() {
        let log = log();
        let written = log
            .append(
                Event::new(EventKind::CostCharged, "metabolism")
                    .with_payload(json!({"agent_id": "agent-1", "cost_amount": 25.0})),
            )
            .unwrap();

        let read = log.get(written.event_id).unwrap().unwrap();
        assert_eq!(read, written);
        assert_eq!(read.payload["cost_amount"], 25.0);
    }

    #[test]
    fn get_nonexistent_returns_none() {
        assert!(log().get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn first_event_has_no_previous_hash_and_second_links_to_first() {
        let log = log();
        let first = log.append(Event::new(EventKind::BudgetAllocated, "metabolism")).unwrap();
        let second = log.append(Event::new(EventKind::CostCharged, "metabolism")).unwrap();

        assert!(first.previous_hash.is_none());
        assert_eq!(
            second.previous_hash,
            Some(hasher::hash_event(&first).unwrap())
        );
    }

    #[test]
    fn hash_chain_is_valid() {
        let log = log();
        for i in 0..5 {
            log.append(
                Event::new(EventKind::Other("sensor_read".into()), format!("agent-{}", i))
                    .with_payload(json!({"i": i})),
            )
            .unwrap();
        }
        assert_eq!(log.verify_chain().unwrap(), 5);
    }

    #[test]
    fn tampering_is_detected() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let log = EventLog::new(store.clone());
        for _ in 0..3 {
            log.append(Event::new(EventKind::CostCharged, "metabolism")).unwrap();
        }

        // Bypass the append-only trigger the way an attacker with file access could.
        store
            .write(|tx| -> Result<(), StoreError> {
                tx.execute_batch(
                    "DROP TRIGGER events_no_update;
                     UPDATE events SET actor = 'mallory' WHERE seq = 2;",
                )?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            log.verify_chain(),
            Err(AuditError::IntegrityViolation { seq: 2, .. })
        ));
    }

    #[test]
    fn latest_respects_filter() {
        let log = log();
        log.append(Event::new(EventKind::CostCharged, "metabolism")).unwrap();
        let quarantine = log
            .append(Event::new(EventKind::AgentQuarantined, "immune_system"))
            .unwrap();
        log.append(Event::new(EventKind::CostCharged, "metabolism")).unwrap();

        let found = log
            .latest(&EventFilter::new().kind(EventKind::AgentQuarantined))
            .unwrap()
            .unwrap();
        assert_eq!(found.event_id, quarantine.event_id);

        let by_actor = log
            .find(&EventFilter::new().actor("metabolism"), 10)
            .unwrap();
        assert_eq!(by_actor.len(), 2);

        assert!(log
            .latest(&EventFilter::new().kind(EventKind::SystemRollback))
            .unwrap()
            .is_none());
    }

    #[test]
    fn recent_returns_oldest_first() {
        let log = log();
        let ids: Vec<Uuid> = (0..4)
            .map(|_| {
                log.append(Event::new(EventKind::CostCharged, "metabolism"))
                    .unwrap()
                    .event_id
            })
            .collect();

        let recent: Vec<Uuid> = log.recent(2).unwrap().iter().map(|e| e.event_id).collect();
        assert_eq!(recent, ids[2..].to_vec());
        assert_eq!(log.len().unwrap(), 4);
    }

    #[test]
    fn chain_from_walks_causal_links() {
        let log = log();
        let root = log
            .append(Event::new(EventKind::AgentActionInitiated, "agent-1"))
            .unwrap();
        log.append(Event::new(EventKind::CostCharged, "metabolism")).unwrap();
        let done = log
            .append(
                Event::new(EventKind::AgentActionCompleted, "agent-1").with_previous(root.event_id),
            )
            .unwrap();

        let chain = log.chain_from(done.event_id).unwrap();
        let ids: Vec<Uuid> = chain.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![done.event_id, root.event_id]);
    }

    #[test]
    fn dangling_predecessor_is_rejected_by_the_store() {
        let log = log();
        let result = log.append(
            Event::new(EventKind::AgentActionCompleted, "agent-1").with_previous(Uuid::new_v4()),
        );
        assert!(matches!(result, Err(AuditError::Store(_))));
        assert!(log.is_empty().unwrap());
    }
}
