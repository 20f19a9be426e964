//! # apex-metabolism
//!
//! Per-agent budget windows and the append-only cost ledger.
//!
//! Each agent holds at most one allocation: a total, an amount spent, and
//! a window `[window_start, window_end]`. Outside the window the agent has
//! nothing to spend. Charges are checked and applied atomically, so
//! concurrent charges against one budget can never overspend it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use apex_metabolism::Metabolism;
//! use apex_store::Store;
//!
//! let metabolism = Metabolism::new(Arc::new(Store::open_in_memory().unwrap()));
//! metabolism.allocate_budget("agent-1", 100.0, 24).unwrap();
//! metabolism.charge_cost("agent-1", "api_call", 25.0, None).unwrap();
//! assert_eq!(metabolism.get_remaining_budget("agent-1").unwrap(), 75.0);
//! ```

pub mod budget;
pub mod error;
pub mod ledger;

pub use budget::{AgentBudget, CostLedgerEntry};
pub use error::MetabolismError;
pub use ledger::{revoke_remaining_in, Metabolism, DEFAULT_WINDOW_HOURS};
