//! Resolution domain types
//!
//! Which side won, who decided, the append-only history record, and the
//! options and outcomes of bulk and automatic resolution.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::conflict::{ConflictCategory, EnhancedSyncConflict, Severity, SyncConflict};
use super::errors::DomainError;
use super::newtypes::{ConflictId, ConflictTypeKey, EntityKey, Payload};

/// Which payload wins a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the device copy
    Client,
    /// Keep the server copy
    Server,
    /// Keep a caller-supplied combination of both
    Merge,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Client => "client",
            Resolution::Server => "server",
            Resolution::Merge => "merge",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Resolution::Client),
            "server" => Ok(Resolution::Server),
            "merge" => Ok(Resolution::Merge),
            other => Err(DomainError::UnknownVariant {
                kind: "resolution",
                value: other.to_string(),
            }),
        }
    }
}

/// Who or what chose the resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionActor {
    /// The user picked the winner (manually or through a bulk action)
    User,
    /// The engine applied its own suggestion
    Auto,
}

impl ResolutionActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionActor::User => "user",
            ResolutionActor::Auto => "auto",
        }
    }
}

impl fmt::Display for ResolutionActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionActor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ResolutionActor::User),
            "auto" => Ok(ResolutionActor::Auto),
            other => Err(DomainError::UnknownVariant {
                kind: "actor",
                value: other.to_string(),
            }),
        }
    }
}

/// Append-only history entry written when a conflict is resolved
///
/// Exactly one record exists per resolved conflict. Records are never
/// updated; retention may delete them once they are old enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub conflict_id: ConflictId,
    pub entity: EntityKey,
    pub conflict_type: ConflictTypeKey,
    pub resolution: Resolution,
    /// Present only when `resolution` is [`Resolution::Merge`]
    pub merged_payload: Option<Payload>,
    pub actor: ResolutionActor,
    pub resolved_at: DateTime<Utc>,
    /// Copied from the raw conflict
    pub detected_at: DateTime<Utc>,
}

impl ResolutionRecord {
    /// Creates a record for a conflict resolved now
    ///
    /// A merged payload passed alongside a non-merge resolution is dropped.
    pub fn new(
        conflict: &SyncConflict,
        conflict_type: ConflictTypeKey,
        resolution: Resolution,
        merged_payload: Option<Payload>,
        actor: ResolutionActor,
    ) -> Self {
        let merged_payload = match resolution {
            Resolution::Merge => merged_payload,
            Resolution::Client | Resolution::Server => None,
        };

        Self {
            conflict_id: *conflict.id(),
            entity: conflict.entity().clone(),
            conflict_type,
            resolution,
            merged_payload,
            actor,
            resolved_at: Utc::now(),
            detected_at: conflict.detected_at(),
        }
    }

    /// Time between detection and resolution, never negative
    pub fn latency(&self) -> Duration {
        let latency = self.resolved_at - self.detected_at;
        if latency < Duration::zero() {
            Duration::zero()
        } else {
            latency
        }
    }
}

// ============================================================================
// Bulk resolution
// ============================================================================

/// Strategy applied to every matching conflict in a bulk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkStrategy {
    ClientWins,
    ServerWins,
    /// Combine both payloads with the deterministic field merge rule
    MergeByRule,
    /// Apply each conflict's own suggested resolution
    ApplySuggestions,
}

impl BulkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkStrategy::ClientWins => "client-wins",
            BulkStrategy::ServerWins => "server-wins",
            BulkStrategy::MergeByRule => "merge-by-rule",
            BulkStrategy::ApplySuggestions => "apply-suggestions",
        }
    }
}

impl fmt::Display for BulkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client-wins" => Ok(BulkStrategy::ClientWins),
            "server-wins" => Ok(BulkStrategy::ServerWins),
            "merge-by-rule" => Ok(BulkStrategy::MergeByRule),
            "apply-suggestions" => Ok(BulkStrategy::ApplySuggestions),
            other => Err(DomainError::UnknownVariant {
                kind: "bulk strategy",
                value: other.to_string(),
            }),
        }
    }
}

/// Selects which conflicts a bulk operation touches
///
/// All fields are optional; when `None`, no filtering is applied for that
/// field. Multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictFilter {
    pub categories: Option<Vec<ConflictCategory>>,
    pub severities: Option<Vec<Severity>>,
    pub conflict_types: Option<Vec<ConflictTypeKey>>,
    /// Entity tables (e.g. `account`)
    pub tables: Option<Vec<String>>,
}

impl ConflictFilter {
    /// Creates a new empty filter (matches every conflict)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = ConflictCategory>) -> Self {
        self.categories = Some(categories.into_iter().collect());
        self
    }

    pub fn with_severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severities = Some(severities.into_iter().collect());
        self
    }

    pub fn with_conflict_types(
        mut self,
        types: impl IntoIterator<Item = ConflictTypeKey>,
    ) -> Self {
        self.conflict_types = Some(types.into_iter().collect());
        self
    }

    pub fn with_tables<S: Into<String>>(mut self, tables: impl IntoIterator<Item = S>) -> Self {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.categories.is_none()
            && self.severities.is_none()
            && self.conflict_types.is_none()
            && self.tables.is_none()
    }

    /// Returns true if the conflict satisfies every configured criterion
    pub fn matches(&self, conflict: &EnhancedSyncConflict) -> bool {
        if let Some(categories) = &self.categories {
            if !categories.contains(&conflict.category) {
                return false;
            }
        }
        if let Some(severities) = &self.severities {
            if !severities.contains(&conflict.severity) {
                return false;
            }
        }
        if let Some(types) = &self.conflict_types {
            if !types.contains(&conflict.conflict_type) {
                return false;
            }
        }
        if let Some(tables) = &self.tables {
            if !tables.iter().any(|t| t == conflict.entity().table()) {
                return false;
            }
        }
        true
    }
}

/// Options for a bulk resolution; the strategy has no default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResolutionOptions {
    pub strategy: BulkStrategy,
    #[serde(default)]
    pub filter: Option<ConflictFilter>,
    /// Count what would happen without committing anything
    #[serde(default)]
    pub dry_run: bool,
}

impl BulkResolutionOptions {
    pub fn new(strategy: BulkStrategy) -> Self {
        Self {
            strategy,
            filter: None,
            dry_run: false,
        }
    }

    pub fn with_filter(mut self, filter: ConflictFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Whether the conflict is selected by the (optional) filter
    pub fn selects(&self, conflict: &EnhancedSyncConflict) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(conflict))
    }
}

/// Result of a bulk resolution operation
///
/// `resolved + failed + skipped` always equals the number of input conflicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    pub resolved: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

impl BulkResult {
    pub fn total(&self) -> u32 {
        self.resolved + self.failed + self.skipped
    }
}

/// Result of an automatic resolution pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoResolveOutcome {
    pub resolved: Vec<EnhancedSyncConflict>,
    pub remaining: Vec<EnhancedSyncConflict>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_conflict() -> SyncConflict {
        let now = Utc::now();
        SyncConflict::new(
            "account:42".parse().unwrap(),
            json!({"name": "Checking"}).as_object().cloned().unwrap(),
            json!({"name": "Main"}).as_object().cloned().unwrap(),
            now,
            now,
        )
        .with_detected_at(now - Duration::seconds(90))
    }

    #[test]
    fn test_resolution_display_and_parse() {
        for resolution in [Resolution::Client, Resolution::Server, Resolution::Merge] {
            assert_eq!(resolution.to_string().parse::<Resolution>().unwrap(), resolution);
        }
        assert!("keep_both".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_actor_serialization() {
        assert_eq!(serde_json::to_string(&ResolutionActor::Auto).unwrap(), "\"auto\"");
        assert_eq!("user".parse::<ResolutionActor>().unwrap(), ResolutionActor::User);
    }

    #[test]
    fn test_bulk_strategy_names() {
        assert_eq!(
            serde_json::to_string(&BulkStrategy::ApplySuggestions).unwrap(),
            "\"apply-suggestions\""
        );
        assert_eq!(
            "server-wins".parse::<BulkStrategy>().unwrap(),
            BulkStrategy::ServerWins
        );
    }

    #[test]
    fn test_record_drops_merge_payload_for_plain_resolution() {
        let conflict = sample_conflict();
        let merged = json!({"name": "x"}).as_object().cloned();
        let record = ResolutionRecord::new(
            &conflict,
            ConflictTypeKey::from_parts("data", ["name"]),
            Resolution::Server,
            merged,
            ResolutionActor::User,
        );
        assert!(record.merged_payload.is_none());
        assert_eq!(record.detected_at, conflict.detected_at());
        assert_eq!(record.conflict_id, *conflict.id());
    }

    #[test]
    fn test_record_latency() {
        let conflict = sample_conflict();
        let record = ResolutionRecord::new(
            &conflict,
            ConflictTypeKey::from_parts("data", ["name"]),
            Resolution::Client,
            None,
            ResolutionActor::User,
        );
        assert!(record.latency() >= Duration::seconds(90));
    }

    #[test]
    fn test_empty_filter_is_empty() {
        assert!(ConflictFilter::new().is_empty());
        assert!(!ConflictFilter::new().with_tables(["account"]).is_empty());
    }

    #[test]
    fn test_bulk_result_total() {
        let result = BulkResult {
            resolved: 3,
            failed: 1,
            skipped: 2,
            errors: vec!["boom".into()],
        };
        assert_eq!(result.total(), 6);
    }
}
