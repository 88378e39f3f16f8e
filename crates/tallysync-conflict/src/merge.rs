//! Field-wise merge used by the `merge-by-rule` bulk strategy and by
//! automatic resolution when the suggested winner is a merge

use serde_json::Value;

use tallysync_core::domain::{EnhancedSyncConflict, FieldDiff, Payload, Resolution};

use crate::classifier::Classifier;

/// Combines both payloads of a classified conflict
///
/// - A field present on one side only is kept.
/// - An unchanged field keeps its (client) value.
/// - A changed protected field takes the server value.
/// - Two arrays are unioned: client order first, then server-only elements.
/// - Two objects are merged recursively with the same rules.
/// - Anything else takes the value of the side written last.
///
/// Values are compared with the classifier's equality, so numbers within
/// its epsilon count as equal at every nesting level.
pub fn merge_by_rule(conflict: &EnhancedSyncConflict, classifier: &Classifier) -> Payload {
    let merger = Merger {
        classifier,
        later: conflict.conflict.later_side(),
    };

    conflict
        .diff
        .iter()
        .filter_map(|d| merger.field(d, conflict).map(|v| (d.field.clone(), v)))
        .collect()
}

struct Merger<'a> {
    classifier: &'a Classifier,
    later: Resolution,
}

impl Merger<'_> {
    fn field(&self, diff: &FieldDiff, conflict: &EnhancedSyncConflict) -> Option<Value> {
        match (&diff.client_value, &diff.server_value) {
            (Some(c), None) => Some(c.clone()),
            (None, Some(s)) => Some(s.clone()),
            (None, None) => None,
            (Some(c), Some(_)) if !diff.changed => Some(c.clone()),
            (Some(_), Some(s)) if conflict.protected_fields.contains(&diff.field) => {
                Some(s.clone())
            }
            (Some(c), Some(s)) => Some(self.values(c, s)),
        }
    }

    fn values(&self, client: &Value, server: &Value) -> Value {
        if self.classifier.values_equal(client, server) {
            return client.clone();
        }

        match (client, server) {
            (Value::Array(c), Value::Array(s)) => {
                let mut merged = c.clone();
                for item in s {
                    if !merged.iter().any(|m| self.classifier.values_equal(m, item)) {
                        merged.push(item.clone());
                    }
                }
                Value::Array(merged)
            }
            (Value::Object(c), Value::Object(s)) => {
                let mut merged = c.clone();
                for (key, server_value) in s {
                    let value = match c.get(key) {
                        Some(client_value) => self.values(client_value, server_value),
                        None => server_value.clone(),
                    };
                    merged.insert(key.clone(), value);
                }
                Value::Object(merged)
            }
            _ => match self.later {
                Resolution::Client => client.clone(),
                Resolution::Server | Resolution::Merge => server.clone(),
            },
        }
    }
}
