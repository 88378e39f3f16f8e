//! Diagnostic export
//!
//! A read-only snapshot of everything the engine knows, serialized as
//! pretty-printed JSON for support bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tallysync_core::domain::{
    ConflictResolutionStats, EnhancedSyncConflict, ResolutionRecord, UserResolutionPattern,
};

use crate::error::ConflictError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSnapshot {
    pub exported_at: DateTime<Utc>,
    pub outstanding: Vec<EnhancedSyncConflict>,
    pub history: Vec<ResolutionRecord>,
    pub patterns: Vec<UserResolutionPattern>,
    pub stats: ConflictResolutionStats,
}

impl DiagnosticSnapshot {
    pub fn to_json(&self) -> Result<String, ConflictError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
