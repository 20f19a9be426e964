// kernel.rs — Kernel: the only path from an agent to an effect.
//
// Every action runs the same fixed pipeline:
//
//   1. quarantined?          → AgentConstraintViolation (no log, no charge)
//   2. budget covers cost?   → no: quarantine, BudgetExceeded
//   3. log agent_action_initiated + create pending ActuatorAction
//   4. charge the cost       → lost a race: mark failed, post-log, BudgetExceeded
//   5. run the executor      → error or panic: mark failed, quarantine
//   6. log agent_action_completed, linked to the step 3 event
//   7. return the result or the executor error
//
// Each step is its own store transaction; the pipeline as a whole is not.
// The executor never runs while the store is locked.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use apex_arbiter::SystemState;
use apex_audit::{append_in, Event, EventKind};
use apex_immune::ImmuneSystem;
use apex_metabolism::{Metabolism, MetabolismError};
use apex_store::column::{json_at, opt_json_at, to_json, uuid_at};
use apex_store::{Store, StoreError};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::action::{ActionStatus, ActuatorAction};
use crate::error::KernelError;
use crate::executor::ActionExecutor;

const ACTION_COLUMNS: &str =
    "action_id, agent_id, action_type, payload, cost, status, result, error, timestamp";

/// The action pipeline over a shared store.
///
/// Cloning is cheap; clones share the store and the executor.
#[derive(Clone)]
pub struct Kernel {
    store: Arc<Store>,
    metabolism: Metabolism,
    immune: ImmuneSystem,
    executor: Arc<dyn ActionExecutor>,
}

/// Outcome of steps 4-5, carried into the post-log.
struct Finished {
    status: ActionStatus,
    result: Option<Value>,
    error: Option<String>,
}

impl Kernel {
    pub fn new(store: Arc<Store>, executor: impl ActionExecutor + 'static) -> Self {
        Self::with_executor(store, Arc::new(executor))
    }

    /// Build a kernel around an executor that is already shared.
    pub fn with_executor(store: Arc<Store>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            metabolism: Metabolism::new(store.clone()),
            immune: ImmuneSystem::new(store.clone()),
            store,
            executor,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn metabolism(&self) -> &Metabolism {
        &self.metabolism
    }

    pub fn immune(&self) -> &ImmuneSystem {
        &self.immune
    }

    /// Bind an agent identity. Refused while the agent is quarantined.
    pub fn session(&self, agent_id: &str) -> Result<AgentSession, KernelError> {
        if self.immune.is_quarantined(agent_id)? {
            tracing::warn!(agent_id, "session refused for quarantined agent");
            return Err(KernelError::AgentConstraintViolation {
                agent_id: agent_id.to_string(),
            });
        }
        Ok(AgentSession {
            kernel: self.clone(),
            agent_id: agent_id.to_string(),
        })
    }

    /// Run one agent action through the full pipeline.
    pub fn execute_action(
        &self,
        agent_id: &str,
        action_type: &str,
        payload: Value,
        cost: f64,
    ) -> Result<Value, KernelError> {
        if self.immune.is_quarantined(agent_id)? {
            tracing::warn!(agent_id, action_type, "action refused: agent quarantined");
            return Err(KernelError::AgentConstraintViolation {
                agent_id: agent_id.to_string(),
            });
        }
        if !cost.is_finite() || cost < 0.0 {
            return Err(KernelError::InvalidCost(cost));
        }

        if !self.metabolism.check_budget(agent_id, cost)? {
            let remaining = self.metabolism.get_remaining_budget(agent_id)?;
            self.immune.quarantine_agent(
                agent_id,
                &format!(
                    "attempted action without sufficient budget (required: {cost}, remaining: {remaining})"
                ),
            )?;
            return Err(KernelError::BudgetExceeded {
                agent_id: agent_id.to_string(),
                required: cost,
                remaining,
            });
        }

        let (action_id, initiated) = self.begin(agent_id, action_type, &payload, cost)?;
        self.charge(agent_id, action_type, cost, action_id, initiated.event_id)?;

        let outcome = self.run_executor(action_type, &payload);
        let finished = match &outcome {
            Ok(result) => Finished {
                status: ActionStatus::Success,
                result: Some(result.clone()),
                error: None,
            },
            Err(err) => Finished {
                status: ActionStatus::Failed,
                result: None,
                error: Some(format!("{err:#}")),
            },
        };
        self.finish(action_id, &finished)?;

        let quarantined = match &finished.error {
            Some(error) => self
                .immune
                .quarantine_agent(agent_id, &format!("action failed: {error}"))
                .map(|_| ()),
            None => Ok(()),
        };
        self.post_log(agent_id, action_id, initiated.event_id, &finished)?;
        quarantined?;

        match outcome {
            Ok(result) => {
                tracing::info!(agent_id, action_type, %action_id, cost, "action succeeded");
                Ok(result)
            }
            Err(error) => {
                tracing::warn!(agent_id, action_type, %action_id, error = %format!("{error:#}"), "action failed");
                Err(KernelError::Executor { action_id, error })
            }
        }
    }

    /// Agents cannot change the system state. The request is logged for the
    /// arbiter's operators and always answered `false`.
    pub fn request_escalation(
        &self,
        agent_id: &str,
        to_state: SystemState,
        trigger: &str,
    ) -> Result<bool, KernelError> {
        self.store.write(|tx| {
            append_in(
                tx,
                Event::new(EventKind::EscalationRequest, agent_id).with_payload(json!({
                    "to_state": to_state,
                    "trigger": trigger,
                })),
            )
        })?;
        tracing::info!(agent_id, %to_state, trigger, "escalation requested");
        Ok(false)
    }

    pub fn get_action(&self, action_id: Uuid) -> Result<Option<ActuatorAction>, KernelError> {
        Ok(self.store.read(|conn| -> Result<Option<ActuatorAction>, StoreError> {
            Ok(conn
                .query_row(
                    &format!("SELECT {ACTION_COLUMNS} FROM actuator_actions WHERE action_id = ?1"),
                    [action_id.to_string()],
                    map_action,
                )
                .optional()?)
        })?)
    }

    /// Actions still `pending`, oldest first. Each one is a debit whose
    /// outcome was never recorded.
    pub fn pending_actions(&self) -> Result<Vec<ActuatorAction>, KernelError> {
        Ok(self.store.read(|conn| {
            query_actions(
                conn,
                "WHERE status = ?1",
                ActionStatus::Pending.as_str(),
            )
        })?)
    }

    /// All actions by one agent, oldest first.
    pub fn agent_actions(&self, agent_id: &str) -> Result<Vec<ActuatorAction>, KernelError> {
        Ok(self
            .store
            .read(|conn| query_actions(conn, "WHERE agent_id = ?1", agent_id))?)
    }

    /// Step 3: log the initiation and record the pending action, together.
    fn begin(
        &self,
        agent_id: &str,
        action_type: &str,
        payload: &Value,
        cost: f64,
    ) -> Result<(Uuid, Event), KernelError> {
        let action_id = Uuid::new_v4();
        let initiated = self.store.write(|tx| -> Result<Event, StoreError> {
            let event = append_in(
                tx,
                Event::new(EventKind::AgentActionInitiated, agent_id).with_payload(json!({
                    "action_id": action_id,
                    "action_type": action_type,
                    "action_payload": payload,
                    "cost": cost,
                })),
            )?;
            tx.execute(
                "INSERT INTO actuator_actions
                   (action_id, agent_id, action_type, payload, cost, status, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    action_id.to_string(),
                    agent_id,
                    action_type,
                    to_json(payload)?,
                    cost,
                    ActionStatus::Pending.as_str(),
                    event.timestamp,
                ],
            )?;
            Ok(event)
        })?;
        tracing::debug!(agent_id, action_type, %action_id, cost, "action initiated");
        Ok((action_id, initiated))
    }

    /// Step 4. A refusal here means another debit won the race after the
    /// pre-flight check: the action fails and is post-logged, with no
    /// quarantine.
    fn charge(
        &self,
        agent_id: &str,
        action_type: &str,
        cost: f64,
        action_id: Uuid,
        initiated: Uuid,
    ) -> Result<(), KernelError> {
        let Err(e) = self
            .metabolism
            .charge_cost(agent_id, action_type, cost, Some(action_id))
        else {
            return Ok(());
        };
        if let MetabolismError::BudgetExceeded { .. } = e {
            let finished = Finished {
                status: ActionStatus::Failed,
                result: None,
                error: Some(e.to_string()),
            };
            self.finish(action_id, &finished)?;
            self.post_log(agent_id, action_id, initiated, &finished)?;
            tracing::warn!(agent_id, %action_id, "charge refused after pre-flight check passed");
        }
        Err(e.into())
    }

    /// Step 5. A panicking executor counts as a failed action.
    fn run_executor(&self, action_type: &str, payload: &Value) -> anyhow::Result<Value> {
        panic::catch_unwind(AssertUnwindSafe(|| self.executor.execute(action_type, payload)))
            .unwrap_or_else(|cause| {
                Err(anyhow::anyhow!(
                    "executor panicked: {}",
                    panic_message(cause.as_ref())
                ))
            })
    }

    /// Move a pending action to its terminal status.
    fn finish(&self, action_id: Uuid, finished: &Finished) -> Result<(), KernelError> {
        self.store.write(|tx| -> Result<(), StoreError> {
            let result = finished.result.as_ref().map(to_json).transpose()?;
            let updated = tx.execute(
                "UPDATE actuator_actions SET status = ?2, result = ?3, error = ?4
                 WHERE action_id = ?1 AND status = 'pending'",
                params![
                    action_id.to_string(),
                    finished.status.as_str(),
                    result,
                    finished.error,
                ],
            )?;
            if updated != 1 {
                return Err(StoreError::Corrupt {
                    collection: "actuator_actions",
                    detail: format!("action {action_id} was not pending when it finished"),
                });
            }
            Ok(())
        })?;
        Ok(())
    }

    fn post_log(
        &self,
        agent_id: &str,
        action_id: Uuid,
        initiated: Uuid,
        finished: &Finished,
    ) -> Result<(), KernelError> {
        self.store.write(|tx| {
            append_in(
                tx,
                Event::new(EventKind::AgentActionCompleted, agent_id)
                    .with_payload(json!({
                        "action_id": action_id,
                        "status": finished.status,
                        "result": finished.result,
                        "error": finished.error,
                    }))
                    .with_previous(initiated),
            )
        })?;
        Ok(())
    }
}

/// An agent identity bound to a kernel.
///
/// Holding a session does not exempt the agent from anything: every call
/// still runs the full pipeline, so a quarantine that lands after the
/// session was opened is enforced on the next action.
#[derive(Clone)]
pub struct AgentSession {
    kernel: Kernel,
    agent_id: String,
}

impl AgentSession {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn execute_action(
        &self,
        action_type: &str,
        payload: Value,
        cost: f64,
    ) -> Result<Value, KernelError> {
        self.kernel
            .execute_action(&self.agent_id, action_type, payload, cost)
    }

    pub fn request_escalation(
        &self,
        to_state: SystemState,
        trigger: &str,
    ) -> Result<bool, KernelError> {
        self.kernel
            .request_escalation(&self.agent_id, to_state, trigger)
    }

    pub fn remaining_budget(&self) -> Result<f64, KernelError> {
        Ok(self.kernel.metabolism.get_remaining_budget(&self.agent_id)?)
    }

    pub fn is_quarantined(&self) -> Result<bool, KernelError> {
        Ok(self.kernel.immune.is_quarantined(&self.agent_id)?)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn query_actions(
    conn: &Connection,
    filter: &str,
    value: &str,
) -> Result<Vec<ActuatorAction>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACTION_COLUMNS} FROM actuator_actions {filter} ORDER BY seq ASC"
    ))?;
    let rows = stmt.query_map([value], map_action)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn map_action(row: &Row<'_>) -> rusqlite::Result<ActuatorAction> {
    let status: String = row.get(5)?;
    let status = ActionStatus::from_db(&status)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(5, "status".into(), Type::Text))?;
    Ok(ActuatorAction {
        action_id: uuid_at(row, 0)?,
        agent_id: row.get(1)?,
        action_type: row.get(2)?,
        payload: json_at(row, 3)?,
        cost: row.get(4)?,
        status,
        result: opt_json_at(row, 6)?,
        error: row.get(7)?,
        timestamp: row.get(8)?,
    })
}
