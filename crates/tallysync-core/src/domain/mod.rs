//! Domain entities and business logic
//!
//! This module contains the core domain types for Tallysync:
//! - Newtypes for type-safe identifiers and validated domain types
//! - Raw and classified conflict types
//! - Resolution history and bulk-operation types
//! - Learned resolution patterns
//! - Aggregate statistics
//! - Domain-specific error types

pub mod conflict;
pub mod errors;
pub mod newtypes;
pub mod pattern;
pub mod resolution;
pub mod stats;

// Re-export commonly used types
pub use conflict::{ConflictCategory, EnhancedSyncConflict, FieldDiff, Severity, SyncConflict};
pub use errors::DomainError;
pub use newtypes::*;
pub use pattern::{PatternSuggestion, UserResolutionPattern};
pub use resolution::{
    AutoResolveOutcome, BulkResolutionOptions, BulkResult, BulkStrategy, ConflictFilter,
    Resolution, ResolutionActor, ResolutionRecord,
};
pub use stats::{ConflictResolutionStats, ConflictTypeCount};
