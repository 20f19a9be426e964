// ledger.rs — Metabolism: budget allocation, checks and charges.
//
// Every action has a cost; no budget, no action. Budgets are windows in
// time: an allocation opens `[now, now + window]`, and once the window
// closes the agent has nothing to spend until it is re-funded.
//
// The charge path is the one place a lost update would let an agent
// overspend, so it runs as a single write transaction that re-checks the
// window and then applies a conditional UPDATE which only succeeds while
// `total_budget - spent_budget` still covers the cost.

use std::sync::Arc;

use apex_audit::{append_in, Event, EventKind};
use apex_store::column::{opt_uuid_at, uuid_at};
use apex_store::{Store, StoreError};
use chrono::{Datelike, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

use crate::budget::{AgentBudget, CostLedgerEntry};
use crate::error::MetabolismError;

const MAX_WINDOW_YEAR: i32 = 9999;

/// Actor name recorded on events this component writes.
pub const ACTOR: &str = "metabolism";

/// Window length used when a caller does not choose one.
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Handle to the budget ledger in a shared store.
#[derive(Clone)]
pub struct Metabolism {
    store: Arc<Store>,
}

impl Metabolism {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Allocate `total_budget` to an agent for the next `window_hours`.
    ///
    /// Replaces any prior allocation outright: spent resets to zero, unspent
    /// budget does not carry over, and the old window is discarded.
    pub fn allocate_budget(
        &self,
        agent_id: &str,
        total_budget: f64,
        window_hours: u32,
    ) -> Result<AgentBudget, MetabolismError> {
        self.allocate_budget_for(agent_id, total_budget, Duration::hours(window_hours.into()))
    }

    /// Allocate with an arbitrary window length.
    pub fn allocate_budget_for(
        &self,
        agent_id: &str,
        total_budget: f64,
        window: Duration,
    ) -> Result<AgentBudget, MetabolismError> {
        validate_amount("total_budget", total_budget)?;
        let now = Utc::now();
        // Stored bounds compare as text, so the window must end within
        // four-digit years.
        let window_end = now
            .checked_add_signed(window)
            .filter(|end| window >= Duration::zero() && end.year() <= MAX_WINDOW_YEAR)
            .ok_or(MetabolismError::InvalidWindow {
                seconds: window.num_seconds(),
            })?;
        let budget = AgentBudget {
            agent_id: agent_id.to_string(),
            total_budget,
            spent_budget: 0.0,
            window_start: now,
            window_end,
        };

        self.store.write(|tx| -> Result<(), MetabolismError> {
            tx.execute(
                "INSERT INTO agent_budgets
                   (agent_id, total_budget, spent_budget, window_start, window_end)
                 VALUES (?1, ?2, 0, ?3, ?4)
                 ON CONFLICT(agent_id) DO UPDATE SET
                   total_budget = excluded.total_budget,
                   spent_budget = 0,
                   window_start = excluded.window_start,
                   window_end = excluded.window_end",
                params![
                    budget.agent_id,
                    budget.total_budget,
                    budget.window_start,
                    budget.window_end
                ],
            )?;
            append_in(
                tx,
                Event::new(EventKind::BudgetAllocated, ACTOR).with_payload(json!({
                    "agent_id": agent_id,
                    "total_budget": total_budget,
                    "window_hours": window.num_seconds() as f64 / 3600.0,
                })),
            )?;
            Ok(())
        })?;

        tracing::info!(agent_id, total_budget, window_end = %budget.window_end, "budget allocated");
        Ok(budget)
    }

    /// Whether the agent could pay `required_cost` right now.
    ///
    /// False with no allocation or an expired window. Pure read: no events.
    pub fn check_budget(&self, agent_id: &str, required_cost: f64) -> Result<bool, MetabolismError> {
        let now = Utc::now();
        Ok(self
            .get_budget(agent_id)?
            .is_some_and(|b| b.can_cover(required_cost, now)))
    }

    /// Charge a cost against the agent's budget.
    ///
    /// Atomically re-checks the budget, appends a ledger entry, increments
    /// `spent_budget` and records a `cost_charged` event. On
    /// `BudgetExceeded` nothing is written.
    pub fn charge_cost(
        &self,
        agent_id: &str,
        cost_type: &str,
        cost_amount: f64,
        action_id: Option<Uuid>,
    ) -> Result<CostLedgerEntry, MetabolismError> {
        validate_amount("cost_amount", cost_amount)?;
        let entry = self
            .store
            .write(|tx| charge_in(tx, agent_id, cost_type, cost_amount, action_id))?;
        tracing::info!(agent_id, cost_type, cost_amount, "cost charged");
        Ok(entry)
    }

    /// Spendable budget: 0.0 with no allocation or an expired window.
    pub fn get_remaining_budget(&self, agent_id: &str) -> Result<f64, MetabolismError> {
        let now = Utc::now();
        Ok(self
            .get_budget(agent_id)?
            .map(|b| b.remaining_at(now))
            .unwrap_or(0.0))
    }

    /// Sum of all ledger entries for the agent, optionally for one cost type.
    pub fn get_total_cost(
        &self,
        agent_id: &str,
        cost_type: Option<&str>,
    ) -> Result<f64, MetabolismError> {
        let total = self.store.read(|conn| -> Result<f64, StoreError> {
            Ok(conn.query_row(
                "SELECT COALESCE(SUM(cost_amount), 0.0) FROM cost_ledger
                 WHERE agent_id = ?1 AND (?2 IS NULL OR cost_type = ?2)",
                params![agent_id, cost_type],
                |row| row.get(0),
            )?)
        })?;
        Ok(total)
    }

    /// The agent's current allocation record, if any.
    pub fn get_budget(&self, agent_id: &str) -> Result<Option<AgentBudget>, MetabolismError> {
        Ok(self.store.read(|conn| load_budget(conn, agent_id))?)
    }

    /// All charges for the agent, oldest first.
    pub fn ledger_entries(&self, agent_id: &str) -> Result<Vec<CostLedgerEntry>, MetabolismError> {
        let entries = self.store.read(|conn| -> Result<Vec<CostLedgerEntry>, StoreError> {
            let mut stmt = conn.prepare(
                "SELECT entry_id, agent_id, action_id, cost_type, cost_amount, timestamp
                 FROM cost_ledger WHERE agent_id = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map([agent_id], map_entry)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        Ok(entries)
    }
}

/// Zero an agent's spendable budget inside an open transaction by setting
/// `spent_budget = total_budget`. The ledger is untouched.
///
/// Returns the amount that was still spendable, or `None` when the agent
/// has no allocation.
pub fn revoke_remaining_in(conn: &Connection, agent_id: &str) -> Result<Option<f64>, StoreError> {
    let Some(budget) = load_budget(conn, agent_id)? else {
        return Ok(None);
    };
    let forfeited = budget.remaining_at(Utc::now());
    conn.execute(
        "UPDATE agent_budgets SET spent_budget = total_budget WHERE agent_id = ?1",
        [agent_id],
    )?;
    Ok(Some(forfeited))
}

fn charge_in(
    conn: &Connection,
    agent_id: &str,
    cost_type: &str,
    cost_amount: f64,
    action_id: Option<Uuid>,
) -> Result<CostLedgerEntry, MetabolismError> {
    let now = Utc::now();
    let budget = load_budget(conn, agent_id)?;
    let exceeded = || MetabolismError::BudgetExceeded {
        agent_id: agent_id.to_string(),
        required: cost_amount,
        remaining: budget.as_ref().map(|b| b.remaining_at(now)).unwrap_or(0.0),
    };

    if !budget.as_ref().is_some_and(|b| b.can_cover(cost_amount, now)) {
        return Err(exceeded());
    }

    let updated = conn.execute(
        "UPDATE agent_budgets SET spent_budget = spent_budget + ?2
         WHERE agent_id = ?1 AND total_budget - spent_budget >= ?2",
        params![agent_id, cost_amount],
    )?;
    if updated == 0 {
        return Err(exceeded());
    }

    let entry = CostLedgerEntry {
        entry_id: Uuid::new_v4(),
        agent_id: agent_id.to_string(),
        action_id,
        cost_type: cost_type.to_string(),
        cost_amount,
        timestamp: now,
    };
    conn.execute(
        "INSERT INTO cost_ledger (entry_id, agent_id, action_id, cost_type, cost_amount, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.entry_id.to_string(),
            entry.agent_id,
            entry.action_id.map(|id| id.to_string()),
            entry.cost_type,
            entry.cost_amount,
            entry.timestamp,
        ],
    )?;
    append_in(
        conn,
        Event::new(EventKind::CostCharged, ACTOR).with_payload(json!({
            "agent_id": agent_id,
            "cost_type": cost_type,
            "cost_amount": cost_amount,
            "action_id": action_id,
        })),
    )?;
    Ok(entry)
}

fn load_budget(conn: &Connection, agent_id: &str) -> Result<Option<AgentBudget>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT agent_id, total_budget, spent_budget, window_start, window_end
             FROM agent_budgets WHERE agent_id = ?1",
            [agent_id],
            |row| {
                Ok(AgentBudget {
                    agent_id: row.get(0)?,
                    total_budget: row.get(1)?,
                    spent_budget: row.get(2)?,
                    window_start: row.get(3)?,
                    window_end: row.get(4)?,
                })
            },
        )
        .optional()?)
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<CostLedgerEntry> {
    Ok(CostLedgerEntry {
        entry_id: uuid_at(row, 0)?,
        agent_id: row.get(1)?,
        action_id: opt_uuid_at(row, 2)?,
        cost_type: row.get(3)?,
        cost_amount: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn validate_amount(field: &'static str, value: f64) -> Result<(), MetabolismError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MetabolismError::InvalidAmount { field, value })
    }
}
