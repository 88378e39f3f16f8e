//! Conflict source port (driving side of the transport)
//!
//! The synchronization transport pushes and pulls records and is the first
//! to notice that two writes diverged. The engine only needs to ask it for
//! the divergences it currently knows about.

use crate::domain::SyncConflict;

/// Port trait for the synchronization transport
///
/// ## Implementation Notes
///
/// - Returned conflicts carry both payloads and both modification times.
/// - The same divergence must always be reported with the same
///   [`ConflictId`](crate::domain::ConflictId); the store ignores
///   conflicts it already knows, so repeated reports are harmless.
#[async_trait::async_trait]
pub trait IConflictSource: Send + Sync {
    /// Fetches every divergence the transport currently considers outstanding
    async fn fetch_outstanding(&self) -> anyhow::Result<Vec<SyncConflict>>;
}
