//! # apex-kernel
//!
//! The action pipeline every agent action must pass through.
//!
//! [`Kernel::execute_action`] checks quarantine and budget, logs the
//! attempt, charges the cost, runs the agent-supplied [`ActionExecutor`],
//! and logs the outcome linked to the attempt. An executor failure
//! quarantines the agent.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use apex_kernel::Kernel;
//! use apex_store::Store;
//! use serde_json::{json, Value};
//!
//! let store = Arc::new(Store::open_in_memory().unwrap());
//! let kernel = Kernel::new(store, |_: &str, payload: &Value| -> anyhow::Result<Value> {
//!     Ok(json!({ "ok": payload }))
//! });
//! kernel.metabolism().allocate_budget("agent-1", 100.0, 24).unwrap();
//!
//! let session = kernel.session("agent-1").unwrap();
//! session.execute_action("sensor_read", json!({"sensor": 3}), 5.0).unwrap();
//! assert_eq!(session.remaining_budget().unwrap(), 95.0);
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod executor;
pub mod kernel;

pub use action::{ActionStatus, ActuatorAction};
pub use config::ApexConfig;
pub use error::KernelError;
pub use executor::ActionExecutor;
pub use kernel::{AgentSession, Kernel};
