//! Resolution history retention

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::{engine::ResolutionEngine, error::ConflictError};

/// Resolution time before which records are pruned
///
/// `None` when the window reaches past the earliest representable time, in
/// which case nothing can be old enough to prune.
pub fn cutoff(older_than_days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(older_than_days)).and_then(|window| now.checked_sub_signed(window))
}

/// Deletes resolution records older than `older_than_days` together with
/// their raw conflict rows
///
/// Unresolved conflicts are never deleted, however old. Runs under the
/// engine's mutation lock.
pub async fn prune_resolved(
    engine: &ResolutionEngine,
    older_than_days: u32,
) -> Result<u64, ConflictError> {
    let _guard = engine.lock().await;

    let Some(cutoff) = cutoff(older_than_days, Utc::now()) else {
        debug!(older_than_days, "Retention window exceeds time range, nothing to prune");
        return Ok(0);
    };
    let pruned = engine.store().prune_resolutions(cutoff).await?;

    info!(
        older_than_days,
        cutoff = %cutoff,
        pruned,
        "Pruned resolution history"
    );
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tallysync_core::domain::{Resolution, ResolutionActor, ResolutionRecord};
    use tallysync_core::ports::IConflictStore;

    use crate::testing::{payload, raw_conflict, Harness};

    /// Stores a conflict resolved `days` ago, bypassing the engine
    async fn resolved_days_ago(harness: &Harness, id: u32, days: i64) -> ResolutionRecord {
        let raw = raw_conflict(&format!("transaction:{id}"), json!({"memo": "a"}), json!({"memo": "b"}));
        harness.store.save_conflict(&raw).await.unwrap();

        let mut record = ResolutionRecord::new(
            &raw,
            harness.engine.classifier().classify(&raw).conflict_type,
            Resolution::Server,
            None,
            ResolutionActor::User,
        );
        record.resolved_at = Utc::now() - Duration::days(days);
        harness
            .store
            .commit_resolution(&record, &payload(json!({"memo": "b"})))
            .await
            .unwrap();
        record
    }

    #[test]
    fn test_cutoff() {
        let now = Utc::now();
        assert_eq!(cutoff(30, now), Some(now - Duration::days(30)));
        assert_eq!(cutoff(0, now), Some(now));
        assert_eq!(cutoff(u32::MAX, now), None);
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_and_unresolved() {
        let stale = raw_conflict("account:7", json!({"name": "a"}), json!({"name": "b"}))
            .with_detected_at(Utc::now() - Duration::days(60));
        let harness = Harness::with_conflicts(vec![stale.clone()]).await;

        let old = resolved_days_ago(&harness, 1, 45).await;
        let recent = resolved_days_ago(&harness, 2, 10).await;

        let pruned = prune_resolved(&harness.engine, 30).await.unwrap();

        assert_eq!(pruned, 1);
        let history = harness.store.list_resolutions().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].conflict_id, recent.conflict_id);
        assert!(harness.store.get_conflict(&old.conflict_id).await.unwrap().is_none());
        assert!(harness.store.get_conflict(stale.id()).await.unwrap().is_some());

        let outstanding = harness.store.list_outstanding().await.unwrap();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].id(), stale.id());
    }

    #[tokio::test]
    async fn test_prune_with_huge_window_keeps_everything() {
        let harness = Harness::with_conflicts(Vec::new()).await;
        let ancient = resolved_days_ago(&harness, 1, 3650).await;

        let pruned = prune_resolved(&harness.engine, u32::MAX).await.unwrap();

        assert_eq!(pruned, 0);
        let history = harness.store.list_resolutions().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].conflict_id, ancient.conflict_id);
    }

    #[tokio::test]
    async fn test_prune_with_nothing_to_delete() {
        let harness = Harness::with_conflicts(Vec::new()).await;
        assert_eq!(prune_resolved(&harness.engine, 1).await.unwrap(), 0);
    }
}
