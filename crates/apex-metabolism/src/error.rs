// error.rs — Error types for the budget ledger.

use apex_store::StoreError;
use thiserror::Error;

/// Errors that can occur during budget operations.
#[derive(Debug, Error)]
pub enum MetabolismError {
    /// The agent cannot cover the cost: no budget, expired window, or too
    /// little remaining. Nothing was written.
    #[error("agent '{agent_id}' has insufficient budget for cost {required} (remaining: {remaining})")]
    BudgetExceeded {
        agent_id: String,
        required: f64,
        remaining: f64,
    },

    /// A budget or cost amount was negative, NaN or infinite.
    #[error("invalid {field}: {value} (must be a finite, non-negative number)")]
    InvalidAmount { field: &'static str, value: f64 },

    /// A budget window was negative or ended past year 9999.
    #[error("invalid budget window of {seconds}s (must be non-negative and end before year 10000)")]
    InvalidWindow { seconds: i64 },

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for MetabolismError {
    fn from(e: rusqlite::Error) -> Self {
        MetabolismError::Store(e.into())
    }
}
