// Interleaved calls from many threads against one store.

use std::sync::Arc;
use std::thread;

use apex_arbiter::{Arbiter, SystemState};
use apex_kernel::{Kernel, KernelError};
use apex_metabolism::{Metabolism, MetabolismError};
use apex_immune::ImmuneSystem;
use apex_store::{Store, StoreConfig};
use serde_json::{json, Value};

fn ok(_: &str, _: &Value) -> anyhow::Result<Value> {
    Ok(json!({ "ok": true }))
}

#[test]
fn concurrent_charges_never_overspend() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let metabolism = Metabolism::new(store);
    metabolism.allocate_budget("A", 100.0, 24).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let metabolism = metabolism.clone();
            thread::spawn(move || {
                let mut charged = 0;
                for _ in 0..20 {
                    match metabolism.charge_cost("A", "compute", 1.0, None) {
                        Ok(_) => charged += 1,
                        Err(MetabolismError::BudgetExceeded { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                charged
            })
        })
        .collect();
    let charged: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(charged, 100);
    let budget = metabolism.get_budget("A").unwrap().unwrap();
    assert_eq!(budget.spent_budget, budget.total_budget);
    assert_eq!(metabolism.ledger_entries("A").unwrap().len(), 100);
}

#[test]
fn separate_connections_share_one_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apex.db");
    let config = StoreConfig::default();
    Metabolism::new(Arc::new(Store::open(&path, &config).unwrap()))
        .allocate_budget("A", 30.0, 24)
        .unwrap();

    // One connection per thread, as separate processes would have.
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let config = config.clone();
            thread::spawn(move || {
                let metabolism = Metabolism::new(Arc::new(Store::open(&path, &config).unwrap()));
                (0..15)
                    .filter(|_| metabolism.charge_cost("A", "compute", 1.0, None).is_ok())
                    .count()
            })
        })
        .collect();
    let charged: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(charged, 30);
    let metabolism = Metabolism::new(Arc::new(Store::open(&path, &config).unwrap()));
    assert_eq!(metabolism.get_remaining_budget("A").unwrap(), 0.0);
    assert_eq!(metabolism.get_total_cost("A", None).unwrap(), 30.0);
}

#[test]
fn concurrent_quarantines_merge() {
    let immune = ImmuneSystem::new(Arc::new(Store::open_in_memory().unwrap()));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let immune = immune.clone();
            thread::spawn(move || immune.quarantine_agent("Y", &format!("reason-{i}")).unwrap())
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let history = immune.quarantine_history("Y").unwrap();
    assert_eq!(history.len(), 1);
    let mut reasons: Vec<&str> = history[0].reasons().collect();
    reasons.sort_unstable();
    let mut expected: Vec<String> = (0..10).map(|i| format!("reason-{i}")).collect();
    expected.sort_unstable();
    assert_eq!(reasons, expected);
}

#[test]
fn racing_transitions_apply_once() {
    let store = Arc::new(Store::open_in_memory().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                Arbiter::new(store)
                    .request_transition(SystemState::Alert, "anomaly", None)
                    .is_ok()
            })
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    // ALERT -> ALERT is not an edge, so only the first request wins.
    assert_eq!(accepted, 1);
    let arbiter = Arbiter::new(store);
    assert_eq!(arbiter.current_state().unwrap(), SystemState::Alert);
    assert_eq!(arbiter.history(10).unwrap().len(), 1);
}

#[test]
fn concurrent_actions_spend_exactly_the_budget() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let kernel = Kernel::new(store, ok);
    kernel.metabolism().allocate_budget("A", 50.0, 24).unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let kernel = kernel.clone();
            thread::spawn(move || {
                let mut succeeded = 0;
                for _ in 0..10 {
                    match kernel.execute_action("A", "tick", Value::Null, 1.0) {
                        Ok(_) => succeeded += 1,
                        Err(KernelError::BudgetExceeded { .. })
                        | Err(KernelError::AgentConstraintViolation { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                succeeded
            })
        })
        .collect();
    let succeeded: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(succeeded, 50);
    assert_eq!(kernel.metabolism().get_total_cost("A", None).unwrap(), 50.0);
    let budget = kernel.metabolism().get_budget("A").unwrap().unwrap();
    assert!(budget.spent_budget <= budget.total_budget);
    assert!(kernel.pending_actions().unwrap().is_empty());
    // Running dry is a budget violation, so the agent ends up quarantined.
    assert!(kernel.immune().is_quarantined("A").unwrap());
}
