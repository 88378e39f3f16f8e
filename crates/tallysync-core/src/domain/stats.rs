//! Aggregate resolution statistics
//!
//! Always derived from the resolution history and the outstanding conflict
//! set; never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ConflictTypeKey;
use super::pattern::UserResolutionPattern;

/// How often one conflict type has been seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictTypeCount {
    pub conflict_type: ConflictTypeKey,
    pub count: u64,
    /// Latest detection time among the counted conflicts
    pub last_seen: DateTime<Utc>,
}

/// Snapshot of resolution activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionStats {
    pub total_conflicts: u64,
    pub resolved_conflicts: u64,
    pub pending_conflicts: u64,
    pub auto_resolved_conflicts: u64,
    pub user_resolved_conflicts: u64,
    /// Mean of `resolved_at - detected_at`, in milliseconds
    pub average_resolution_time_ms: f64,
    /// `resolved / (resolved + pending)` at the time of the call
    pub resolution_success_rate: f64,
    /// Most frequent first; ties broken by most recent occurrence
    pub common_conflict_types: Vec<ConflictTypeCount>,
    pub user_patterns: Vec<UserResolutionPattern>,
}

impl ConflictResolutionStats {
    /// The zero-valued result returned when no history is available
    pub fn empty() -> Self {
        Self::default()
    }
}
