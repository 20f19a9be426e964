// End-to-end behavior of the kernel and its components over one store.

use std::sync::Arc;

use apex_arbiter::{Arbiter, ArbiterError, Denial, SystemState};
use apex_audit::{EventFilter, EventKind, EventLog};
use apex_immune::ImmuneError;
use apex_kernel::{ActionStatus, ApexConfig, Kernel, KernelError};
use apex_metabolism::{Metabolism, MetabolismError};
use apex_store::Store;
use serde_json::{json, Value};

fn echo(action_type: &str, payload: &Value) -> anyhow::Result<Value> {
    Ok(json!({ "action": action_type, "payload": payload }))
}

fn broken(_: &str, _: &Value) -> anyhow::Result<Value> {
    Err(anyhow::anyhow!("connection refused").context("upstream call"))
}

fn store() -> Arc<Store> {
    Arc::new(Store::open_in_memory().unwrap())
}

#[test]
fn allocate_and_charge_leaves_remainder() {
    let metabolism = Metabolism::new(store());
    metabolism.allocate_budget("X", 100.0, 24).unwrap();
    metabolism.charge_cost("X", "api_call", 25.0, None).unwrap();
    assert_eq!(metabolism.get_remaining_budget("X").unwrap(), 75.0);
}

#[test]
fn overspend_is_refused_and_budget_unchanged() {
    let metabolism = Metabolism::new(store());
    metabolism.allocate_budget("X", 10.0, 24).unwrap();
    assert!(matches!(
        metabolism.charge_cost("X", "api_call", 50.0, None),
        Err(MetabolismError::BudgetExceeded { .. })
    ));
    assert_eq!(metabolism.get_remaining_budget("X").unwrap(), 10.0);
}

#[test]
fn observe_cannot_jump_to_act() {
    let arbiter = Arbiter::new(store());
    assert!(matches!(
        arbiter.request_transition(SystemState::Act, "eager", None),
        Err(ArbiterError::TransitionDenied {
            reason: Denial::IllegalTransition,
            ..
        })
    ));
    assert_eq!(arbiter.current_state().unwrap(), SystemState::Observe);
}

#[test]
fn defend_needs_intent_architect_or_arbiter() {
    let arbiter = Arbiter::new(store());
    arbiter
        .request_transition(SystemState::Alert, "anomaly", None)
        .unwrap();

    assert!(arbiter
        .request_transition(SystemState::Defend, "breach", Some("operator:bob"))
        .is_err());
    assert_eq!(arbiter.current_state().unwrap(), SystemState::Alert);

    arbiter
        .request_transition(SystemState::Defend, "breach", Some("intent_architect:admin"))
        .unwrap();
    assert_eq!(arbiter.current_state().unwrap(), SystemState::Defend);
}

#[test]
fn failing_executor_quarantines_agent() {
    let store = store();
    let kernel = Kernel::new(store.clone(), broken);
    kernel.metabolism().allocate_budget("A", 100.0, 24).unwrap();

    let err = kernel
        .execute_action("A", "external_call", json!({"url": "https://example.invalid"}), 5.0)
        .unwrap_err();
    let KernelError::Executor { action_id, .. } = err else {
        panic!("expected executor error");
    };

    let action = kernel.get_action(action_id).unwrap().unwrap();
    assert_eq!(action.status, ActionStatus::Failed);
    assert_eq!(action.error.as_deref(), Some("upstream call: connection refused"));
    assert!(action.result.is_none());
    assert!(kernel.immune().is_quarantined("A").unwrap());

    // Every later action is refused until release.
    assert!(matches!(
        kernel.execute_action("A", "external_call", Value::Null, 0.0),
        Err(KernelError::AgentConstraintViolation { .. })
    ));
}

#[test]
fn double_quarantine_keeps_one_record() {
    let kernel = Kernel::new(store(), echo);
    kernel.immune().quarantine_agent("Y", "r1").unwrap();
    kernel.immune().quarantine_agent("Y", "r2").unwrap();

    let history = kernel.immune().quarantine_history("Y").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, "r1; r2");
    assert!(history[0].is_open());
}

#[test]
fn release_is_not_idempotent() {
    let kernel = Kernel::new(store(), echo);
    kernel.immune().quarantine_agent("Y", "r1").unwrap();
    kernel.immune().release_agent("Y", "operator:alice").unwrap();
    assert!(matches!(
        kernel.immune().release_agent("Y", "operator:alice"),
        Err(ImmuneError::NotQuarantined { .. })
    ));
}

#[test]
fn quarantine_holds_until_release_and_refund() {
    let kernel = Kernel::new(store(), echo);
    kernel.metabolism().allocate_budget("A", 100.0, 24).unwrap();
    kernel.immune().quarantine_agent("A", "suspicious").unwrap();

    for _ in 0..3 {
        assert!(matches!(
            kernel.execute_action("A", "ping", Value::Null, 1.0),
            Err(KernelError::AgentConstraintViolation { .. })
        ));
    }

    kernel.immune().release_agent("A", "operator:alice").unwrap();
    // Released but still broke: the forfeited budget is not restored, and
    // the failed pre-flight check puts the agent straight back in quarantine.
    assert!(matches!(
        kernel.execute_action("A", "ping", Value::Null, 1.0),
        Err(KernelError::BudgetExceeded { remaining, .. }) if remaining == 0.0
    ));
    assert!(kernel.immune().is_quarantined("A").unwrap());

    kernel.immune().release_agent("A", "operator:alice").unwrap();
    kernel.metabolism().allocate_budget("A", 10.0, 24).unwrap();
    kernel.execute_action("A", "ping", Value::Null, 1.0).unwrap();
}

#[test]
fn every_action_has_linked_provenance() {
    let store = store();
    let log = EventLog::new(store.clone());
    let kernel = Kernel::new(store, echo);
    kernel.metabolism().allocate_budget("A", 10.0, 24).unwrap();

    for i in 0..3 {
        kernel
            .execute_action("A", "sensor_read", json!({ "sensor": i }), 1.0)
            .unwrap();
    }

    let completions = log
        .find(&EventFilter::new().kind(EventKind::AgentActionCompleted), 10)
        .unwrap();
    assert_eq!(completions.len(), 3);
    for completed in completions {
        let chain = log.chain_from(completed.event_id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].event_type, EventKind::AgentActionInitiated);
        assert_eq!(chain[1].payload["action_id"], completed.payload["action_id"]);
        assert!(chain[1].timestamp <= completed.timestamp);
    }

    assert_eq!(log.verify_chain().unwrap(), log.len().unwrap());
}

#[test]
fn pipeline_writes_events_in_order() {
    let store = store();
    let log = EventLog::new(store.clone());
    let kernel = Kernel::new(store, echo);
    kernel.metabolism().allocate_budget("A", 10.0, 24).unwrap();
    kernel
        .execute_action("A", "report", json!({"period": "daily"}), 2.0)
        .unwrap();

    let kinds: Vec<EventKind> = log
        .recent(10)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::BudgetAllocated,
            EventKind::AgentActionInitiated,
            EventKind::CostCharged,
            EventKind::AgentActionCompleted,
        ]
    );
}

#[test]
fn spent_never_exceeds_total() {
    let kernel = Kernel::new(store(), echo);
    kernel.metabolism().allocate_budget("A", 7.5, 24).unwrap();

    let mut successes = 0;
    for _ in 0..10 {
        if kernel.execute_action("A", "tick", Value::Null, 1.0).is_ok() {
            successes += 1;
        }
        let budget = kernel.metabolism().get_budget("A").unwrap().unwrap();
        assert!(budget.spent_budget <= budget.total_budget);
    }
    assert_eq!(successes, 7);
    assert_eq!(kernel.metabolism().get_total_cost("A", None).unwrap(), 7.0);
}

#[test]
fn file_backed_kernel_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = ApexConfig::for_project(dir.path());

    let action_id = {
        let kernel = Kernel::new(config.open_store().unwrap(), echo);
        kernel.metabolism().allocate_budget("A", 10.0, 24).unwrap();
        kernel
            .execute_action("A", "report", Value::Null, 4.0)
            .unwrap();
        kernel.agent_actions("A").unwrap()[0].action_id
    };

    let kernel = Kernel::new(config.open_store().unwrap(), echo);
    assert_eq!(kernel.metabolism().get_remaining_budget("A").unwrap(), 6.0);
    assert_eq!(
        kernel.get_action(action_id).unwrap().unwrap().status,
        ActionStatus::Success
    );
    let log = EventLog::new(kernel.store().clone());
    assert_eq!(log.verify_chain().unwrap(), 4);
}
