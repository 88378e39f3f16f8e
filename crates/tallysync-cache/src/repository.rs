//! SQLite implementation of IConflictStore
//!
//! ## Type Mapping
//!
//! | Domain Type          | SQL Type | Strategy                                      |
//! |----------------------|----------|-----------------------------------------------|
//! | ConflictId           | TEXT     | UUID string via `to_string()` / `FromStr`      |
//! | EntityKey            | 2 × TEXT | `entity_table` + `record_id` columns           |
//! | ConflictTypeKey      | TEXT     | `category:fields` via `as_str()` / `FromStr`   |
//! | Payload              | TEXT     | serde_json object                              |
//! | Resolution, Actor    | TEXT     | `as_str()` / `FromStr`                         |
//! | DateTime<Utc>        | TEXT     | RFC 3339, microseconds, `Z` suffix             |
//! | Vec<Resolution>      | TEXT     | serde_json array                               |

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tallysync_core::domain::{
    ConflictId, ConflictTypeKey, EntityKey, Payload, Resolution, ResolutionActor,
    ResolutionRecord, SyncConflict, UserResolutionPattern,
};
use tallysync_core::ports::IConflictStore;

use crate::CacheError;

/// SQLite-based implementation of the conflict store port
pub struct SqliteConflictStore {
    pool: SqlitePool,
}

impl SqliteConflictStore {
    /// Creates a new store over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Fixed-width timestamp text, so string order equals time order
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("invalid timestamp '{s}': {e}")))
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, CacheError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| CacheError::SerializationError(format!("invalid {column} '{raw}': {e}")))
}

fn payload_column(row: &SqliteRow, column: &str) -> Result<Payload, CacheError> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}

fn entity_from_row(row: &SqliteRow) -> Result<EntityKey, CacheError> {
    let table: String = row.try_get("entity_table")?;
    let record_id: String = row.try_get("record_id")?;
    EntityKey::new(table, record_id).map_err(|e| CacheError::SerializationError(e.to_string()))
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn conflict_from_row(row: &SqliteRow) -> Result<SyncConflict, CacheError> {
    let id: ConflictId = parse_column(row, "id")?;
    let client_modified_at: String = row.try_get("client_modified_at")?;
    let server_modified_at: String = row.try_get("server_modified_at")?;
    let detected_at: String = row.try_get("detected_at")?;

    Ok(SyncConflict::new(
        entity_from_row(row)?,
        payload_column(row, "client_payload")?,
        payload_column(row, "server_payload")?,
        parse_datetime(&client_modified_at)?,
        parse_datetime(&server_modified_at)?,
    )
    .with_id(id)
    .with_detected_at(parse_datetime(&detected_at)?))
}

fn record_from_row(row: &SqliteRow) -> Result<ResolutionRecord, CacheError> {
    let merged_payload: Option<String> = row.try_get("merged_payload")?;
    let resolved_at: String = row.try_get("resolved_at")?;
    let detected_at: String = row.try_get("detected_at")?;

    Ok(ResolutionRecord {
        conflict_id: parse_column(row, "conflict_id")?,
        entity: entity_from_row(row)?,
        conflict_type: parse_column(row, "conflict_type")?,
        resolution: parse_column(row, "resolution")?,
        merged_payload: merged_payload
            .map(|raw| serde_json::from_str::<Payload>(&raw))
            .transpose()?,
        actor: parse_column(row, "actor")?,
        resolved_at: parse_datetime(&resolved_at)?,
        detected_at: parse_datetime(&detected_at)?,
    })
}

fn pattern_from_row(row: &SqliteRow) -> Result<UserResolutionPattern, CacheError> {
    let recent_choices: String = row.try_get("recent_choices")?;
    let sample_size: i64 = row.try_get("sample_size")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(UserResolutionPattern {
        conflict_type: parse_column::<ConflictTypeKey>(row, "conflict_type")?,
        preferred_resolution: parse_column::<Resolution>(row, "preferred_resolution")?,
        confidence: row.try_get("confidence")?,
        sample_size: u32::try_from(sample_size).map_err(|_| {
            CacheError::SerializationError(format!("invalid sample_size {sample_size}"))
        })?,
        recent_choices: serde_json::from_str(&recent_choices)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

// ============================================================================
// IConflictStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IConflictStore for SqliteConflictStore {
    // --- Raw conflicts ---

    async fn save_conflict(&self, conflict: &SyncConflict) -> anyhow::Result<bool> {
        let id = conflict.id().to_string();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO conflicts \
             (id, entity_table, record_id, client_payload, server_payload, \
              client_modified_at, server_modified_at, detected_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conflict.entity().table())
        .bind(conflict.entity().record_id())
        .bind(serde_json::to_string(conflict.client_payload())?)
        .bind(serde_json::to_string(conflict.server_payload())?)
        .bind(format_datetime(&conflict.client_modified_at()))
        .bind(format_datetime(&conflict.server_modified_at()))
        .bind(format_datetime(&conflict.detected_at()))
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        tracing::trace!(conflict_id = %id, inserted, "Saved conflict");
        Ok(inserted)
    }

    async fn get_conflict(&self, id: &ConflictId) -> anyhow::Result<Option<SyncConflict>> {
        let row = sqlx::query("SELECT * FROM conflicts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(conflict_from_row).transpose()?)
    }

    async fn list_outstanding(&self) -> anyhow::Result<Vec<SyncConflict>> {
        let rows = sqlx::query(
            "SELECT c.* FROM conflicts c \
             LEFT JOIN resolutions r ON r.conflict_id = c.id \
             WHERE r.conflict_id IS NULL \
             ORDER BY c.detected_at DESC, c.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut conflicts = Vec::with_capacity(rows.len());
        for row in &rows {
            conflicts.push(conflict_from_row(row)?);
        }
        Ok(conflicts)
    }

    // --- Resolution history ---

    async fn get_resolution(&self, id: &ConflictId) -> anyhow::Result<Option<ResolutionRecord>> {
        let row = sqlx::query("SELECT * FROM resolutions WHERE conflict_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn commit_resolution(
        &self,
        record: &ResolutionRecord,
        payload: &Payload,
    ) -> anyhow::Result<()> {
        let conflict_id = record.conflict_id.to_string();
        let merged_payload = record
            .merged_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let resolved_at = format_datetime(&record.resolved_at);

        let mut tx = self.pool.begin().await?;

        // Plain INSERT: a second record for the same conflict violates the key
        sqlx::query(
            "INSERT INTO resolutions \
             (conflict_id, entity_table, record_id, conflict_type, resolution, \
              merged_payload, actor, resolved_at, detected_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conflict_id)
        .bind(record.entity.table())
        .bind(record.entity.record_id())
        .bind(record.conflict_type.as_str())
        .bind(record.resolution.as_str())
        .bind(&merged_payload)
        .bind(record.actor.as_str())
        .bind(&resolved_at)
        .bind(format_datetime(&record.detected_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO entities (entity_table, record_id, payload, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (entity_table, record_id) DO UPDATE SET \
             payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(record.entity.table())
        .bind(record.entity.record_id())
        .bind(serde_json::to_string(payload)?)
        .bind(&resolved_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            conflict_id = %conflict_id,
            entity = %record.entity,
            resolution = %record.resolution,
            "Committed resolution"
        );
        Ok(())
    }

    async fn list_resolutions(&self) -> anyhow::Result<Vec<ResolutionRecord>> {
        let rows = sqlx::query("SELECT * FROM resolutions ORDER BY resolved_at ASC, conflict_id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn prune_resolutions(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let cutoff = format_datetime(&cutoff);
        let mut tx = self.pool.begin().await?;

        // Deleting the conflict row cascades to its record
        let conflicts = sqlx::query(
            "DELETE FROM conflicts WHERE id IN \
             (SELECT conflict_id FROM resolutions WHERE resolved_at < ?)",
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let orphans = sqlx::query("DELETE FROM resolutions WHERE resolved_at < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        let pruned = conflicts + orphans;
        tracing::debug!(cutoff = %cutoff, pruned, "Pruned resolution records");
        Ok(pruned)
    }

    // --- Entities ---

    async fn get_entity(&self, key: &EntityKey) -> anyhow::Result<Option<Payload>> {
        let row = sqlx::query("SELECT payload FROM entities WHERE entity_table = ? AND record_id = ?")
            .bind(key.table())
            .bind(key.record_id())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .as_ref()
            .map(|r| payload_column(r, "payload"))
            .transpose()?)
    }

    // --- Patterns ---

    async fn save_pattern(&self, pattern: &UserResolutionPattern) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO resolution_patterns \
             (conflict_type, preferred_resolution, confidence, sample_size, \
              recent_choices, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (conflict_type) DO UPDATE SET \
             preferred_resolution = excluded.preferred_resolution, \
             confidence = excluded.confidence, \
             sample_size = excluded.sample_size, \
             recent_choices = excluded.recent_choices, \
             updated_at = excluded.updated_at",
        )
        .bind(pattern.conflict_type.as_str())
        .bind(pattern.preferred_resolution.as_str())
        .bind(pattern.confidence)
        .bind(i64::from(pattern.sample_size))
        .bind(serde_json::to_string(&pattern.recent_choices)?)
        .bind(format_datetime(&pattern.updated_at))
        .execute(&self.pool)
        .await?;

        tracing::trace!(conflict_type = %pattern.conflict_type, "Saved pattern");
        Ok(())
    }

    async fn list_patterns(&self) -> anyhow::Result<Vec<UserResolutionPattern>> {
        let rows = sqlx::query("SELECT * FROM resolution_patterns ORDER BY conflict_type ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut patterns = Vec::with_capacity(rows.len());
        for row in &rows {
            patterns.push(pattern_from_row(row)?);
        }
        Ok(patterns)
    }
}
