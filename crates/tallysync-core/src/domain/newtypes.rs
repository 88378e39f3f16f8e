//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// A record payload as exchanged with the transport and entity store
///
/// Payloads are flat-ish JSON objects keyed by field name. Nested values
/// (arrays, objects) are compared structurally by the classifier.
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifier for conflict records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new random ConflictId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConflictId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid ConflictId: {e}")))
    }
}

impl From<Uuid> for ConflictId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Entity addressing
// ============================================================================

/// Address of a record in the canonical entity store: `table:record_id`
///
/// The table name must be a non-empty identifier (alphanumerics and `_`);
/// the record id may be any non-empty string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey {
    table: String,
    record_id: String,
}

impl EntityKey {
    /// Create a new EntityKey
    ///
    /// # Errors
    /// Returns error if the table name or record id is invalid
    pub fn new(table: impl Into<String>, record_id: impl Into<String>) -> Result<Self, DomainError> {
        let table = table.into();
        let record_id = record_id.into();

        if table.is_empty() {
            return Err(DomainError::InvalidEntityKey(
                "table name cannot be empty".to_string(),
            ));
        }
        if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DomainError::InvalidEntityKey(format!(
                "table name contains invalid characters: {table}"
            )));
        }
        if record_id.is_empty() {
            return Err(DomainError::InvalidEntityKey(
                "record id cannot be empty".to_string(),
            ));
        }

        Ok(Self { table, record_id })
    }

    /// The entity table (e.g. `account`, `transaction`)
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The record id within the table
    #[must_use]
    pub fn record_id(&self) -> &str {
        &self.record_id
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.record_id)
    }
}

impl FromStr for EntityKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (table, record_id) = s.split_once(':').ok_or_else(|| {
            DomainError::InvalidEntityKey(format!("expected 'table:id', got '{s}'"))
        })?;
        Self::new(table, record_id)
    }
}

impl TryFrom<String> for EntityKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.to_string()
    }
}

// ============================================================================
// Conflict type key
// ============================================================================

/// Key grouping conflicts of the same kind: `category:field1,field2`
///
/// Built from the conflict category and the sorted list of changed field
/// names. The pattern learner and the statistics ranking are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictTypeKey(String);

impl ConflictTypeKey {
    /// Build a key from a category name and the changed field names
    ///
    /// Field order does not matter; names are sorted and de-duplicated.
    pub fn from_parts<'a, I>(category: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut names: Vec<&str> = fields.into_iter().collect();
        names.sort_unstable();
        names.dedup();
        Self(format!("{}:{}", category, names.join(",")))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConflictTypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictTypeKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(':') {
            return Err(DomainError::InvalidId(format!(
                "Invalid ConflictTypeKey: missing ':' in '{s}'"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
