//! Error types for the conflict engine

use tallysync_core::domain::ConflictId;
use thiserror::Error;

/// Errors that can occur during conflict resolution
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The conflict no longer exists or was already resolved
    #[error("conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    /// A merge resolution was requested without a merged payload
    #[error("merge resolution for conflict {0} requires a merged payload")]
    InvalidMergePayload(ConflictId),

    /// Storage error
    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),

    /// Diagnostic export could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConflictError {
    /// Whether refreshing the conflict list and retrying may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConflictError::ConflictNotFound(_))
    }
}
