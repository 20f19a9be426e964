//! # apex-audit
//!
//! Append-only provenance log for the Apex constraint kernel.
//!
//! Every decision point in the kernel is recorded as an [`Event`]. Events
//! are never updated or deleted. Each carries an optional causal link to
//! the event that logically preceded it (`previous_event_id`) and a SHA-256
//! link to the event before it in log order (`previous_hash`), so the log
//! is both a provenance graph and a tamper-evident chain.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use apex_audit::{Event, EventKind, EventLog};
//! use apex_store::Store;
//!
//! let store = Arc::new(Store::open_in_memory().unwrap());
//! let log = EventLog::new(store);
//! let started = log
//!     .append(Event::new(EventKind::AgentActionInitiated, "agent-1"))
//!     .unwrap();
//! log.append(
//!     Event::new(EventKind::AgentActionCompleted, "agent-1").with_previous(started.event_id),
//! )
//! .unwrap();
//! assert_eq!(log.verify_chain().unwrap(), 2);
//! ```

pub mod error;
pub mod event;
pub mod hasher;
pub mod log;

pub use error::AuditError;
pub use event::{Event, EventKind};
pub use log::{append_in, EventFilter, EventLog};
