// error.rs — Error types for quarantine and rollback.

use apex_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImmuneError {
    /// Release was requested for an agent with no open quarantine record.
    #[error("agent '{agent_id}' is not currently quarantined")]
    NotQuarantined { agent_id: String },

    #[error("checkpoint {0} not found")]
    CheckpointNotFound(Uuid),

    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for ImmuneError {
    fn from(e: rusqlite::Error) -> Self {
        ImmuneError::Store(e.into())
    }
}
