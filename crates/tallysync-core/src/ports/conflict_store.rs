//! Conflict store port (driven/secondary port)
//!
//! This module defines the interface for persisting raw conflicts, the
//! resolution history, learned patterns, and resolved entity payloads.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, etc.) and don't need domain-level classification.
//! - A conflict is outstanding while no resolution record exists for it.
//!   Raw conflict rows are immutable and stay in place after resolution
//!   until retention prunes the record that resolved them.
//! - All write operations take references to domain entities, allowing
//!   the caller to retain ownership.

use chrono::{DateTime, Utc};

use crate::domain::{
    ConflictId, EntityKey, Payload, ResolutionRecord, SyncConflict, UserResolutionPattern,
};

/// Port trait for durable conflict-engine state
///
/// ## Implementation Notes
///
/// - `commit_resolution` must be atomic: either both the entity payload and
///   the record are written, or neither is.
/// - `prune_resolutions` must never delete a conflict without a record.
#[async_trait::async_trait]
pub trait IConflictStore: Send + Sync {
    // --- Raw conflicts ---

    /// Stores a raw conflict unless one with the same ID already exists
    ///
    /// Returns `true` if the conflict was inserted.
    async fn save_conflict(&self, conflict: &SyncConflict) -> anyhow::Result<bool>;

    /// Retrieves a raw conflict by ID, resolved or not
    async fn get_conflict(&self, id: &ConflictId) -> anyhow::Result<Option<SyncConflict>>;

    /// Retrieves all conflicts without a resolution record
    ///
    /// Returns conflicts ordered by detection time (newest first).
    async fn list_outstanding(&self) -> anyhow::Result<Vec<SyncConflict>>;

    // --- Resolution history ---

    /// Retrieves the resolution record for a conflict, if it was resolved
    async fn get_resolution(&self, id: &ConflictId) -> anyhow::Result<Option<ResolutionRecord>>;

    /// Writes the winning payload to the entity table and appends the record
    ///
    /// Fails without writing anything if the conflict already has a record.
    async fn commit_resolution(
        &self,
        record: &ResolutionRecord,
        payload: &Payload,
    ) -> anyhow::Result<()>;

    /// Retrieves the full resolution history ordered by resolution time
    /// (oldest first)
    async fn list_resolutions(&self) -> anyhow::Result<Vec<ResolutionRecord>>;

    /// Deletes records resolved before `cutoff` and their raw conflict rows
    ///
    /// Returns the number of records deleted.
    async fn prune_resolutions(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;

    // --- Entities ---

    /// Retrieves the canonical payload of an entity
    async fn get_entity(&self, key: &EntityKey) -> anyhow::Result<Option<Payload>>;

    // --- Patterns ---

    /// Saves a learned pattern (insert or update, keyed by conflict type)
    async fn save_pattern(&self, pattern: &UserResolutionPattern) -> anyhow::Result<()>;

    /// Retrieves all learned patterns
    async fn list_patterns(&self) -> anyhow::Result<Vec<UserResolutionPattern>>;
}
