//! Conflict classification
//!
//! Turns a raw [`SyncConflict`] into an [`EnhancedSyncConflict`]: a
//! field-level diff, a category, a severity, auto-resolvability and a
//! suggested winner. Classification is pure and deterministic; it performs
//! no I/O and holds no mutable state.
//!
//! Category rules are evaluated in priority order:
//! 1. `permission` - an access-control field differs
//! 2. `schema` - a field exists on one side only, or the schema version differs
//! 3. `business_rule` - a changed field breaks a configured cross-field invariant
//! 4. `data` - everything else

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::trace;

use tallysync_core::{
    config::{BusinessRule, ClassifierConfig, Config},
    domain::{
        ConflictCategory, ConflictTypeKey, EnhancedSyncConflict, FieldDiff, Payload,
        PatternSuggestion, Severity, SyncConflict,
    },
};

use crate::fields::FieldMatcher;

/// Rule-based conflict classifier
pub struct Classifier {
    protected: FieldMatcher,
    access_control: FieldMatcher,
    metadata: FieldMatcher,
    schema_version_field: String,
    business_rules: Vec<BusinessRule>,
    protected_relative_threshold: f64,
    high_change_count: usize,
    numeric_epsilon: f64,
    timestamp_confidence: f64,
}

impl Classifier {
    /// Creates a classifier from the classifier section and the confidence
    /// attributed to the "later write wins" default suggestion
    pub fn new(config: &ClassifierConfig, timestamp_confidence: f64) -> Self {
        Self {
            protected: FieldMatcher::new("protected", &config.protected_fields),
            access_control: FieldMatcher::new("access_control", &config.access_control_fields),
            metadata: FieldMatcher::new("metadata", &config.metadata_fields),
            schema_version_field: config.schema_version_field.clone(),
            business_rules: config.business_rules.clone(),
            protected_relative_threshold: config.protected_relative_threshold,
            high_change_count: config.high_change_count,
            numeric_epsilon: config.numeric_epsilon,
            timestamp_confidence,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.classifier, config.learning.timestamp_confidence)
    }

    /// Classifies a raw conflict
    ///
    /// The suggestion is the side written last. Use
    /// [`refine_suggestion`](Self::refine_suggestion) to let a learned
    /// pattern take precedence.
    pub fn classify(&self, raw: &SyncConflict) -> EnhancedSyncConflict {
        let diff = self.diff(raw.client_payload(), raw.server_payload());
        let category = self.categorize(&diff);

        let protected_fields: Vec<String> = diff
            .iter()
            .filter(|d| d.changed && self.protected.matches(&d.field))
            .map(|d| d.field.clone())
            .collect();

        let severity = self.severity(&diff, category, &protected_fields);
        let auto_resolvable = severity.permits_auto_resolution() && protected_fields.is_empty();

        let conflict_type = ConflictTypeKey::from_parts(
            category.as_str(),
            diff.iter()
                .filter(|d| d.changed && !self.metadata.matches(&d.field))
                .map(|d| d.field.as_str()),
        );

        trace!(
            conflict_id = %raw.id(),
            entity = %raw.entity(),
            category = %category,
            severity = %severity,
            auto_resolvable,
            conflict_type = %conflict_type,
            "Classified conflict"
        );

        let mut enhanced = EnhancedSyncConflict {
            conflict: raw.clone(),
            category,
            severity,
            diff,
            protected_fields,
            auto_resolvable,
            suggested_resolution: None,
            suggestion_confidence: 0.0,
            conflict_type,
        };
        self.refine_suggestion(&mut enhanced, None);
        enhanced
    }

    /// Recomputes the suggested resolution
    ///
    /// Starts from "prefer the later write" and replaces it with the learned
    /// suggestion only when that suggestion is strictly more confident.
    /// Never changes category, severity or auto-resolvability.
    pub fn refine_suggestion(
        &self,
        conflict: &mut EnhancedSyncConflict,
        learned: Option<PatternSuggestion>,
    ) {
        conflict.suggested_resolution = Some(conflict.conflict.later_side());
        conflict.suggestion_confidence = self.timestamp_confidence;

        if let Some(learned) = learned {
            if learned.confidence > self.timestamp_confidence {
                trace!(
                    conflict_id = %conflict.id(),
                    resolution = %learned.resolution,
                    confidence = learned.confidence,
                    "Learned suggestion takes precedence"
                );
                conflict.suggested_resolution = Some(learned.resolution);
                conflict.suggestion_confidence = learned.confidence.clamp(0.0, 1.0);
            }
        }
    }

    /// Builds the field-level diff over the union of both key sets
    pub fn diff(&self, client: &Payload, server: &Payload) -> Vec<FieldDiff> {
        let fields: BTreeSet<&String> = client.keys().chain(server.keys()).collect();

        fields
            .into_iter()
            .map(|field| {
                let client_value = client.get(field).cloned();
                let server_value = server.get(field).cloned();
                let changed = match (&client_value, &server_value) {
                    (Some(c), Some(s)) => !self.values_equal(c, s),
                    _ => true,
                };
                FieldDiff {
                    field: field.clone(),
                    client_value,
                    server_value,
                    changed,
                }
            })
            .collect()
    }

    /// Structural equality with an epsilon for numbers
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => {
                    let scale = 1f64.max(x.abs()).max(y.abs());
                    (x - y).abs() <= self.numeric_epsilon * scale
                }
                _ => x == y,
            },
            (Value::Array(xs), Value::Array(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.values_equal(x, y))
            }
            (Value::Object(xs), Value::Object(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .all(|(k, x)| ys.get(k).is_some_and(|y| self.values_equal(x, y)))
            }
            _ => a == b,
        }
    }

    fn categorize(&self, diff: &[FieldDiff]) -> ConflictCategory {
        let changed = || diff.iter().filter(|d| d.changed);

        if changed().any(|d| self.access_control.matches(&d.field)) {
            return ConflictCategory::Permission;
        }

        if changed().any(|d| d.is_one_sided() || d.field == self.schema_version_field) {
            return ConflictCategory::Schema;
        }

        if self
            .business_rules
            .iter()
            .any(|rule| Self::violates(rule, diff))
        {
            return ConflictCategory::BusinessRule;
        }

        ConflictCategory::Data
    }

    /// A rule is violated when its field changed but its linked field,
    /// present on at least one side, did not
    fn violates(rule: &BusinessRule, diff: &[FieldDiff]) -> bool {
        let find = |name: &str| diff.iter().find(|d| d.field == name);

        match (find(&rule.field), find(&rule.linked)) {
            (Some(field), Some(linked)) => field.changed && !linked.changed,
            _ => false,
        }
    }

    fn severity(
        &self,
        diff: &[FieldDiff],
        category: ConflictCategory,
        protected_fields: &[String],
    ) -> Severity {
        if !protected_fields.is_empty() {
            let rule_category = matches!(
                category,
                ConflictCategory::Permission | ConflictCategory::BusinessRule
            );
            let exceeds = diff
                .iter()
                .filter(|d| protected_fields.contains(&d.field))
                .any(|d| self.exceeds_threshold(d));

            return if rule_category || exceeds {
                Severity::Critical
            } else {
                Severity::High
            };
        }

        let substantive = diff
            .iter()
            .filter(|d| d.changed && !self.metadata.matches(&d.field))
            .count();

        if substantive > self.high_change_count {
            Severity::High
        } else if substantive >= 2 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Relative difference of a protected field above the threshold
    ///
    /// Non-numeric or one-sided differences always exceed it.
    fn exceeds_threshold(&self, diff: &FieldDiff) -> bool {
        let (Some(c), Some(s)) = (
            diff.client_value.as_ref().and_then(Value::as_f64),
            diff.server_value.as_ref().and_then(Value::as_f64),
        ) else {
            return true;
        };

        let magnitude = c.abs().max(s.abs());
        if magnitude == 0.0 {
            return false;
        }
        (c - s).abs() / magnitude > self.protected_relative_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tallysync_core::domain::Resolution;

    use crate::testing::{payload, raw_conflict};

    fn classifier() -> Classifier {
        Classifier::from_config(&Config::default())
    }

    #[test]
    fn test_tags_only_difference_is_low_data() {
        let raw = raw_conflict(
            "account:42",
            json!({"balance": 100.00, "tags": ["a"]}),
            json!({"balance": 100.00, "tags": ["a", "b"]}),
        );

        let enhanced = classifier().classify(&raw);

        assert_eq!(enhanced.category, ConflictCategory::Data);
        assert_eq!(enhanced.severity, Severity::Low);
        assert!(enhanced.auto_resolvable);
        assert_eq!(enhanced.changed_fields().collect::<Vec<_>>(), vec!["tags"]);
        assert_eq!(enhanced.conflict_type.as_str(), "data:tags");
    }

    #[test]
    fn test_large_balance_difference_is_critical() {
        let raw = raw_conflict(
            "account:42",
            json!({"balance": 100.00, "tags": ["a"], "name": "x"}),
            json!({"balance": 250.00, "tags": ["a", "b"], "name": "y"}),
        );

        let enhanced = classifier().classify(&raw);

        assert_eq!(enhanced.severity, Severity::Critical);
        assert!(!enhanced.auto_resolvable);
        assert_eq!(enhanced.protected_fields, vec!["balance".to_string()]);
    }

    #[test]
    fn test_small_protected_difference_is_high() {
        let raw = raw_conflict(
            "account:42",
            json!({"balance": 100.00}),
            json!({"balance": 100.50}),
        );

        let enhanced = classifier().classify(&raw);

        assert_eq!(enhanced.severity, Severity::High);
        assert!(!enhanced.auto_resolvable);
    }

    #[test]
    fn test_float_noise_is_not_a_change() {
        let raw = raw_conflict(
            "account:42",
            json!({"balance": 0.1 + 0.2, "name": "a"}),
            json!({"balance": 0.3, "name": "a"}),
        );

        let enhanced = classifier().classify(&raw);

        assert!(enhanced.diff.iter().all(|d| !d.changed));
        assert_eq!(enhanced.severity, Severity::Low);
        assert!(enhanced.auto_resolvable);
    }

    #[test]
    fn test_integer_and_float_compare_equal() {
        let c = classifier();
        assert!(c.values_equal(&json!(100), &json!(100.0)));
        assert!(c.values_equal(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2.0]})));
        assert!(!c.values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!c.values_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_permission_takes_priority() {
        let raw = raw_conflict(
            "budget:7",
            json!({"permissions": ["read"], "memo": "a"}),
            json!({"permissions": ["read", "write"], "category_id": 3}),
        );

        let enhanced = classifier().classify(&raw);

        // memo/category_id are one-sided, which alone would be `schema`
        assert_eq!(enhanced.category, ConflictCategory::Permission);
    }

    #[test]
    fn test_protected_field_in_permission_conflict_is_critical() {
        let raw = raw_conflict(
            "account:1",
            json!({"owner_id": "u1"}),
            json!({"owner_id": "u2"}),
        );

        let enhanced = classifier().classify(&raw);

        assert_eq!(enhanced.category, ConflictCategory::Permission);
        assert_eq!(enhanced.severity, Severity::Critical);
    }

    #[test]
    fn test_one_sided_field_is_schema() {
        let raw = raw_conflict(
            "transaction:9",
            json!({"memo": "lunch", "payee": "Cafe"}),
            json!({"memo": "lunch"}),
        );

        let enhanced = classifier().classify(&raw);

        assert_eq!(enhanced.category, ConflictCategory::Schema);
        let payee = enhanced.diff.iter().find(|d| d.field == "payee").unwrap();
        assert!(payee.changed);
        assert!(payee.server_value.is_none());
    }

    #[test]
    fn test_schema_version_difference_is_schema() {
        let raw = raw_conflict(
            "transaction:9",
            json!({"schema_version": 2, "memo": "a"}),
            json!({"schema_version": 3, "memo": "a"}),
        );

        assert_eq!(classifier().classify(&raw).category, ConflictCategory::Schema);
    }

    #[test]
    fn test_balance_without_transaction_total_is_business_rule() {
        let raw = raw_conflict(
            "account:42",
            json!({"balance": 100.0, "transaction_total": 80.0}),
            json!({"balance": 100.4, "transaction_total": 80.0}),
        );

        let enhanced = classifier().classify(&raw);

        assert_eq!(enhanced.category, ConflictCategory::BusinessRule);
        // protected field involved in a business-rule conflict
        assert_eq!(enhanced.severity, Severity::Critical);
    }

    #[test]
    fn test_rule_satisfied_when_linked_field_also_changed() {
        let raw = raw_conflict(
            "account:42",
            json!({"balance": 100.0, "transaction_total": 80.0}),
            json!({"balance": 100.4, "transaction_total": 80.4}),
        );

        assert_eq!(classifier().classify(&raw).category, ConflictCategory::Data);
    }

    #[test]
    fn test_change_count_thresholds() {
        let c = classifier();

        let medium = raw_conflict(
            "transaction:1",
            json!({"memo": "a", "payee": "x", "note": "n"}),
            json!({"memo": "b", "payee": "y", "note": "n"}),
        );
        assert_eq!(c.classify(&medium).severity, Severity::Medium);
        assert!(c.classify(&medium).auto_resolvable);

        let three = raw_conflict(
            "transaction:1",
            json!({"memo": "a", "payee": "x", "note": "n"}),
            json!({"memo": "b", "payee": "y", "note": "m"}),
        );
        assert_eq!(c.classify(&three).severity, Severity::Medium);

        let high = raw_conflict(
            "transaction:1",
            json!({"memo": "a", "payee": "x", "note": "n", "flag": true}),
            json!({"memo": "b", "payee": "y", "note": "m", "flag": false}),
        );
        let enhanced = c.classify(&high);
        assert_eq!(enhanced.severity, Severity::High);
        assert!(!enhanced.auto_resolvable);
    }

    #[test]
    fn test_metadata_changes_are_not_substantive() {
        let raw = raw_conflict(
            "transaction:1",
            json!({"memo": "a", "updated_at": "t1", "_rev": 1, "version": 4}),
            json!({"memo": "b", "updated_at": "t2", "_rev": 2, "version": 5}),
        );

        let enhanced = classifier().classify(&raw);

        assert_eq!(enhanced.severity, Severity::Low);
        assert_eq!(enhanced.conflict_type.as_str(), "data:memo");
    }

    #[test]
    fn test_suggestion_defaults_to_later_write() {
        let now = Utc::now();
        let raw = SyncConflict::new(
            "transaction:1".parse().unwrap(),
            payload(json!({"memo": "a"})),
            payload(json!({"memo": "b"})),
            now - Duration::hours(1),
            now,
        );

        let enhanced = classifier().classify(&raw);

        assert_eq!(enhanced.suggested_resolution, Some(Resolution::Server));
        assert_eq!(enhanced.suggestion_confidence, 0.5);
    }

    #[test]
    fn test_learned_suggestion_needs_higher_confidence() {
        let c = classifier();
        let raw = raw_conflict("transaction:1", json!({"memo": "a"}), json!({"memo": "b"}));
        let mut enhanced = c.classify(&raw);
        let default = enhanced.suggested_resolution;

        c.refine_suggestion(
            &mut enhanced,
            Some(PatternSuggestion {
                resolution: Resolution::Merge,
                confidence: 0.5,
                sample_size: 10,
            }),
        );
        assert_eq!(enhanced.suggested_resolution, default);

        c.refine_suggestion(
            &mut enhanced,
            Some(PatternSuggestion {
                resolution: Resolution::Merge,
                confidence: 0.9,
                sample_size: 10,
            }),
        );
        assert_eq!(enhanced.suggested_resolution, Some(Resolution::Merge));
        assert_eq!(enhanced.suggestion_confidence, 0.9);
        assert_eq!(enhanced.severity, Severity::Low);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = classifier();
        let raw = raw_conflict(
            "account:3",
            json!({"balance": 10.0, "memo": "a", "tags": [1, 2], "x": null}),
            json!({"balance": 12.0, "memo": "b", "tags": [1], "y": {"k": 1}}),
        );

        let first = c.classify(&raw);
        let second = c.classify(&raw);
        assert_eq!(first, second);
    }

    #[test]
    fn test_auto_resolvable_implies_safe_severity() {
        let c = classifier();
        let samples = [
            (json!({"balance": 1.0}), json!({"balance": 2.0})),
            (json!({"memo": "a"}), json!({"memo": "b"})),
            (json!({"a": 1, "b": 2, "c": 3, "d": 4}), json!({"a": 2, "b": 3, "c": 4, "d": 5})),
            (json!({"acl": "x", "memo": 1}), json!({"acl": "y", "memo": 2})),
            (json!({"amount": 5, "split_total": 5}), json!({"amount": 5.01, "split_total": 5})),
            (json!({}), json!({"payee": "p"})),
        ];

        for (client, server) in samples {
            let enhanced = c.classify(&raw_conflict("transaction:1", client, server));
            if enhanced.auto_resolvable {
                assert!(enhanced.severity <= Severity::Medium);
                assert!(enhanced.protected_fields.is_empty());
            }
        }
    }

    #[test]
    fn test_diff_is_sorted_by_field_name() {
        let enhanced = classifier().classify(&raw_conflict(
            "transaction:1",
            json!({"z": 1, "a": 1}),
            json!({"m": 1, "a": 2}),
        ));
        let fields: Vec<&str> = enhanced.diff.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["a", "m", "z"]);
    }
}
