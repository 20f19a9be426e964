//! # apex-arbiter
//!
//! The system-wide escalation state machine (OBSERVE, ALERT, ACT, DEFEND)
//! and the audit trail for human conflict resolutions.
//!
//! The current state is derived from the latest recorded transition, so
//! any number of [`Arbiter`] handles over the same store agree on it.
//! Entering DEFEND requires an identity accepted by the [`DefendPolicy`].

pub mod arbiter;
pub mod error;
pub mod record;
pub mod state;

pub use arbiter::Arbiter;
pub use error::{ArbiterError, Denial};
pub use record::{ConflictResolution, StateTransition};
pub use state::{DefendPolicy, SystemState};
