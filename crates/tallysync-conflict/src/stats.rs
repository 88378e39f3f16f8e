//! Statistics aggregation
//!
//! Stats are derived on demand from the resolution history, the outstanding
//! set and the learner's patterns. Nothing here is persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use tallysync_core::{
    config::StatsConfig,
    domain::{
        ConflictResolutionStats, ConflictTypeCount, ConflictTypeKey, EnhancedSyncConflict,
        ResolutionActor, ResolutionRecord, UserResolutionPattern,
    },
};

pub struct StatsAggregator {
    common_types_limit: usize,
}

impl StatsAggregator {
    pub fn new(config: &StatsConfig) -> Self {
        Self {
            common_types_limit: config.common_types_limit,
        }
    }

    /// Computes stats; empty inputs yield the zero-valued result
    pub fn compute(
        &self,
        history: &[ResolutionRecord],
        pending: &[EnhancedSyncConflict],
        patterns: Vec<UserResolutionPattern>,
    ) -> ConflictResolutionStats {
        let resolved = history.len() as u64;
        let pending_count = pending.len() as u64;
        let auto = history
            .iter()
            .filter(|r| r.actor == ResolutionActor::Auto)
            .count() as u64;

        let average_resolution_time_ms = if history.is_empty() {
            0.0
        } else {
            let total_ms: f64 = history
                .iter()
                .map(|r| r.latency().num_milliseconds() as f64)
                .sum();
            total_ms / history.len() as f64
        };

        let resolution_success_rate = if resolved + pending_count == 0 {
            0.0
        } else {
            resolved as f64 / (resolved + pending_count) as f64
        };

        ConflictResolutionStats {
            total_conflicts: resolved + pending_count,
            resolved_conflicts: resolved,
            pending_conflicts: pending_count,
            auto_resolved_conflicts: auto,
            user_resolved_conflicts: resolved - auto,
            average_resolution_time_ms,
            resolution_success_rate,
            common_conflict_types: self.rank_types(history, pending),
            user_patterns: patterns,
        }
    }

    /// Ranks conflict types by frequency, then by most recent detection,
    /// then by key
    fn rank_types(
        &self,
        history: &[ResolutionRecord],
        pending: &[EnhancedSyncConflict],
    ) -> Vec<ConflictTypeCount> {
        let mut counts: HashMap<&ConflictTypeKey, (u64, DateTime<Utc>)> = HashMap::new();

        let occurrences = history
            .iter()
            .map(|r| (&r.conflict_type, r.detected_at))
            .chain(
                pending
                    .iter()
                    .map(|c| (&c.conflict_type, c.conflict.detected_at())),
            );

        for (key, seen) in occurrences {
            let entry = counts.entry(key).or_insert((0, seen));
            entry.0 += 1;
            if seen > entry.1 {
                entry.1 = seen;
            }
        }

        let mut ranked: Vec<ConflictTypeCount> = counts
            .into_iter()
            .map(|(key, (count, last_seen))| ConflictTypeCount {
                conflict_type: key.clone(),
                count,
                last_seen,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
                .then_with(|| a.conflict_type.cmp(&b.conflict_type))
        });
        ranked.truncate(self.common_types_limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tallysync_core::config::Config;
    use tallysync_core::domain::Resolution;

    use crate::classifier::Classifier;
    use crate::testing::raw_conflict;

    fn aggregator() -> StatsAggregator {
        StatsAggregator::new(&StatsConfig::default())
    }

    fn record(field: &str, actor: ResolutionActor, age: Duration, latency: Duration) -> ResolutionRecord {
        let raw = raw_conflict("transaction:1", json!({ field: 1 }), json!({ field: 2 }));
        let mut record = ResolutionRecord::new(
            &raw,
            ConflictTypeKey::from_parts("data", [field]),
            Resolution::Server,
            None,
            actor,
        );
        record.detected_at = Utc::now() - age;
        record.resolved_at = record.detected_at + latency;
        record
    }

    #[test]
    fn test_empty_state_is_zero() {
        let stats = aggregator().compute(&[], &[], Vec::new());
        assert_eq!(stats, ConflictResolutionStats::empty());
        assert_eq!(stats.resolution_success_rate, 0.0);
        assert_eq!(stats.average_resolution_time_ms, 0.0);
    }

    #[test]
    fn test_counts_and_rates() {
        let history = vec![
            record("memo", ResolutionActor::User, Duration::hours(3), Duration::seconds(2)),
            record("memo", ResolutionActor::Auto, Duration::hours(2), Duration::seconds(4)),
            record("payee", ResolutionActor::User, Duration::hours(1), Duration::seconds(6)),
        ];
        let classifier = Classifier::from_config(&Config::default());
        let pending = vec![classifier.classify(&raw_conflict(
            "transaction:2",
            json!({"payee": "a"}),
            json!({"payee": "b"}),
        ))];

        let stats = aggregator().compute(&history, &pending, Vec::new());

        assert_eq!(stats.total_conflicts, 4);
        assert_eq!(stats.resolved_conflicts, 3);
        assert_eq!(stats.pending_conflicts, 1);
        assert_eq!(stats.auto_resolved_conflicts, 1);
        assert_eq!(stats.user_resolved_conflicts, 2);
        assert!((stats.average_resolution_time_ms - 4000.0).abs() < 1e-9);
        assert!((stats.resolution_success_rate - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_ranking_breaks_ties_by_recency() {
        let history = vec![
            record("memo", ResolutionActor::User, Duration::hours(5), Duration::seconds(1)),
            record("memo", ResolutionActor::User, Duration::hours(4), Duration::seconds(1)),
            record("payee", ResolutionActor::User, Duration::hours(3), Duration::seconds(1)),
            record("payee", ResolutionActor::User, Duration::hours(1), Duration::seconds(1)),
            record("tags", ResolutionActor::User, Duration::hours(2), Duration::seconds(1)),
        ];

        let stats = aggregator().compute(&history, &[], Vec::new());
        let ranked: Vec<&str> = stats
            .common_conflict_types
            .iter()
            .map(|t| t.conflict_type.as_str())
            .collect();

        assert_eq!(ranked, vec!["data:payee", "data:memo", "data:tags"]);
        assert_eq!(stats.common_conflict_types[0].count, 2);
    }

    #[test]
    fn test_ranking_is_truncated() {
        let aggregator = StatsAggregator::new(&StatsConfig {
            common_types_limit: 1,
        });
        let history = vec![
            record("memo", ResolutionActor::User, Duration::hours(1), Duration::seconds(1)),
            record("payee", ResolutionActor::User, Duration::hours(1), Duration::seconds(1)),
        ];

        let stats = aggregator.compute(&history, &[], Vec::new());
        assert_eq!(stats.common_conflict_types.len(), 1);
    }
}
