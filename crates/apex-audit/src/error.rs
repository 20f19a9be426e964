// error.rs — Error types for the event log.

use apex_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during event log operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The durable store failed. Never retried here.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The log has been tampered with: the hash chain is broken.
    #[error("integrity check failed at seq {seq}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        seq: i64,
        expected: String,
        actual: String,
    },

    /// The requested event does not exist.
    #[error("event not found: {0}")]
    NotFound(Uuid),
}
