//! Conflict domain entities
//!
//! This module defines the raw conflict produced by the synchronization
//! transport and the enriched view derived from it by the classifier.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ConflictId, ConflictTypeKey, EntityKey, Payload};
use super::resolution::Resolution;

/// A divergence between the on-device and the server copy of one record
///
/// Raw conflicts are created by the transport when it notices that both
/// sides wrote the same record. They are immutable: resolving a conflict
/// appends a [`ResolutionRecord`](super::resolution::ResolutionRecord)
/// instead of changing this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Unique identifier for this conflict
    id: ConflictId,
    /// The record that diverged
    entity: EntityKey,
    /// Payload written on the device
    client_payload: Payload,
    /// Payload written on the server
    server_payload: Payload,
    /// When the device copy was last modified
    client_modified_at: DateTime<Utc>,
    /// When the server copy was last modified
    server_modified_at: DateTime<Utc>,
    /// When the divergence was detected
    detected_at: DateTime<Utc>,
}

impl SyncConflict {
    /// Creates a new conflict detected now
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use serde_json::json;
    /// use tallysync_core::domain::{EntityKey, SyncConflict};
    ///
    /// let client = json!({"balance": 100.0}).as_object().cloned().unwrap();
    /// let server = json!({"balance": 120.0}).as_object().cloned().unwrap();
    /// let conflict = SyncConflict::new(
    ///     "account:42".parse::<EntityKey>().unwrap(),
    ///     client,
    ///     server,
    ///     Utc::now(),
    ///     Utc::now(),
    /// );
    /// assert_eq!(conflict.entity().table(), "account");
    /// ```
    pub fn new(
        entity: EntityKey,
        client_payload: Payload,
        server_payload: Payload,
        client_modified_at: DateTime<Utc>,
        server_modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            entity,
            client_payload,
            server_payload,
            client_modified_at,
            server_modified_at,
            detected_at: Utc::now(),
        }
    }

    /// Uses an identifier assigned by the transport or the store
    pub fn with_id(mut self, id: ConflictId) -> Self {
        self.id = id;
        self
    }

    /// Uses the detection time recorded by the transport or the store
    pub fn with_detected_at(mut self, detected_at: DateTime<Utc>) -> Self {
        self.detected_at = detected_at;
        self
    }

    /// Returns the conflict ID
    pub fn id(&self) -> &ConflictId {
        &self.id
    }

    /// Returns the diverged record's address
    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    /// Returns the device-side payload
    pub fn client_payload(&self) -> &Payload {
        &self.client_payload
    }

    /// Returns the server-side payload
    pub fn server_payload(&self) -> &Payload {
        &self.server_payload
    }

    pub fn client_modified_at(&self) -> DateTime<Utc> {
        self.client_modified_at
    }

    pub fn server_modified_at(&self) -> DateTime<Utc> {
        self.server_modified_at
    }

    /// Returns when the conflict was detected
    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// The side whose copy was written last; the server wins ties
    pub fn later_side(&self) -> Resolution {
        if self.client_modified_at > self.server_modified_at {
            Resolution::Client
        } else {
            Resolution::Server
        }
    }
}

/// Risk class of a conflict, assigned by rule in a fixed priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCategory {
    /// Ordinary field values differ
    Data,
    /// The two payloads disagree on which fields exist
    Schema,
    /// Access-control fields differ
    Permission,
    /// A changed field breaks a cross-field domain invariant
    BusinessRule,
}

impl ConflictCategory {
    /// Stable snake_case name used in storage and type keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictCategory::Data => "data",
            ConflictCategory::Schema => "schema",
            ConflictCategory::Permission => "permission",
            ConflictCategory::BusinessRule => "business_rule",
        }
    }
}

impl fmt::Display for ConflictCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(ConflictCategory::Data),
            "schema" => Ok(ConflictCategory::Schema),
            "permission" => Ok(ConflictCategory::Permission),
            "business_rule" => Ok(ConflictCategory::BusinessRule),
            other => Err(DomainError::UnknownVariant {
                kind: "category",
                value: other.to_string(),
            }),
        }
    }
}

/// How risky it is to pick a winner without looking
///
/// Variants are declared in increasing order so `Ord` compares by risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Whether automatic resolution is ever allowed at this severity
    pub fn permits_auto_resolution(&self) -> bool {
        matches!(self, Severity::Low | Severity::Medium)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(DomainError::UnknownVariant {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

/// One field of the structural diff between the two payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    /// `None` when the field is absent from the client payload
    pub client_value: Option<serde_json::Value>,
    /// `None` when the field is absent from the server payload
    pub server_value: Option<serde_json::Value>,
    pub changed: bool,
}

impl FieldDiff {
    /// True when the field exists on exactly one side
    pub fn is_one_sided(&self) -> bool {
        self.client_value.is_some() != self.server_value.is_some()
    }
}

/// A raw conflict together with everything the classifier derived from it
///
/// Never the source of truth: it can always be recomputed from the raw
/// conflict and the learner state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSyncConflict {
    pub conflict: SyncConflict,
    pub category: ConflictCategory,
    pub severity: Severity,
    /// Field-level diff in ascending field-name order
    pub diff: Vec<FieldDiff>,
    /// Changed fields that are configured as protected
    pub protected_fields: Vec<String>,
    pub auto_resolvable: bool,
    pub suggested_resolution: Option<Resolution>,
    /// Confidence attached to the suggestion, in [0, 1]
    pub suggestion_confidence: f64,
    pub conflict_type: ConflictTypeKey,
}

impl EnhancedSyncConflict {
    pub fn id(&self) -> &ConflictId {
        self.conflict.id()
    }

    pub fn entity(&self) -> &EntityKey {
        self.conflict.entity()
    }

    /// Names of the fields whose values differ
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.diff.iter().filter(|d| d.changed).map(|d| d.field.as_str())
    }

    /// True when any protected field differs between the two sides
    pub fn touches_protected_field(&self) -> bool {
        !self.protected_fields.is_empty()
    }
}
