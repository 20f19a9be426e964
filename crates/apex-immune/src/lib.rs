//! # apex-immune
//!
//! The kernel's guard against its own agents.
//!
//! - **Quarantine** cuts an agent off: the kernel refuses its actions and
//!   its remaining budget is forfeited. Only an explicit release lifts it.
//! - **Checkpoints** store opaque snapshots that an authorized operator can
//!   retrieve for rollback.
//! - **Apoptosis** is a quarantine marked as a termination.

pub mod error;
pub mod guard;
pub mod record;

pub use error::ImmuneError;
pub use guard::{ImmuneSystem, TERMINATED_PREFIX};
pub use record::{QuarantineRecord, RollbackCheckpoint};
