// error.rs — Error types for the action pipeline.
//
// Denials (quarantine, budget, cost) and executor failures are domain
// outcomes. `Store` is the only infrastructure failure and is never
// folded into one of them.

use std::path::PathBuf;

use apex_immune::ImmuneError;
use apex_metabolism::MetabolismError;
use apex_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum KernelError {
    /// The agent is quarantined. Nothing was logged or charged.
    #[error("agent '{agent_id}' is quarantined and cannot act")]
    AgentConstraintViolation { agent_id: String },

    /// The agent could not cover the declared cost, either at the pre-flight
    /// check or when the charge was applied.
    #[error("agent '{agent_id}' has insufficient budget for cost {required} (remaining: {remaining})")]
    BudgetExceeded {
        agent_id: String,
        required: f64,
        remaining: f64,
    },

    /// Declared cost was negative, NaN or infinite.
    #[error("invalid action cost {0} (must be a finite, non-negative number)")]
    InvalidCost(f64),

    /// The action executor returned an error. The action is recorded as
    /// failed and the agent has been quarantined.
    #[error("action {action_id} failed: {error:#}")]
    Executor {
        action_id: Uuid,
        error: anyhow::Error,
    },

    /// A budget-ledger error with no pipeline counterpart.
    #[error(transparent)]
    Metabolism(MetabolismError),

    /// An immune-system denial surfaced through the kernel.
    #[error(transparent)]
    Immune(ImmuneError),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for KernelError {
    fn from(e: rusqlite::Error) -> Self {
        KernelError::Store(e.into())
    }
}

impl From<MetabolismError> for KernelError {
    fn from(e: MetabolismError) -> Self {
        match e {
            MetabolismError::BudgetExceeded {
                agent_id,
                required,
                remaining,
            } => KernelError::BudgetExceeded {
                agent_id,
                required,
                remaining,
            },
            MetabolismError::InvalidAmount { value, .. } => KernelError::InvalidCost(value),
            MetabolismError::Store(e) => KernelError::Store(e),
            other => KernelError::Metabolism(other),
        }
    }
}

impl From<ImmuneError> for KernelError {
    fn from(e: ImmuneError) -> Self {
        match e {
            ImmuneError::Store(e) => KernelError::Store(e),
            other => KernelError::Immune(other),
        }
    }
}
