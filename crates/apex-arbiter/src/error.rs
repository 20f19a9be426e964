// error.rs — Error types for the arbiter.

use std::fmt;

use apex_store::StoreError;
use thiserror::Error;

use crate::state::SystemState;

/// Why a transition was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The pair is not an edge of the state machine.
    IllegalTransition,
    /// DEFEND was requested without a privileged identity.
    Unauthorized { authorized_by: Option<String> },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::IllegalTransition => write!(f, "not a permitted transition"),
            Denial::Unauthorized {
                authorized_by: Some(who),
            } => write!(f, "'{}' is not authorized to enter defend", who),
            Denial::Unauthorized {
                authorized_by: None,
            } => write!(f, "entering defend requires an authorizing identity"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArbiterError {
    /// The transition was refused; the current state is unchanged.
    #[error("state transition {from} -> {to} denied: {reason}")]
    TransitionDenied {
        from: SystemState,
        to: SystemState,
        reason: Denial,
    },

    /// A state name that is not one of observe, alert, act, defend.
    #[error("unknown system state '{0}' (expected observe, alert, act or defend)")]
    UnknownState(String),

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for ArbiterError {
    fn from(e: rusqlite::Error) -> Self {
        ArbiterError::Store(e.into())
    }
}
