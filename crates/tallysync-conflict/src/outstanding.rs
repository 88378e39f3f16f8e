//! In-memory set of outstanding classified conflicts
//!
//! Conflicts are keyed by [`ConflictId`] and never reference each other.
//! The set mirrors the store's outstanding list: it is replaced wholesale on
//! refresh and loses an entry as soon as its resolution is committed.

use std::collections::HashMap;

use parking_lot::RwLock;

use tallysync_core::domain::{ConflictId, ConflictTypeKey, EnhancedSyncConflict};

#[derive(Default)]
pub struct OutstandingConflicts {
    entries: RwLock<HashMap<ConflictId, EnhancedSyncConflict>>,
}

impl OutstandingConflicts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&self, conflicts: impl IntoIterator<Item = EnhancedSyncConflict>) {
        let mut entries = self.entries.write();
        entries.clear();
        entries.extend(conflicts.into_iter().map(|c| (*c.id(), c)));
    }

    pub fn remove(&self, id: &ConflictId) -> Option<EnhancedSyncConflict> {
        self.entries.write().remove(id)
    }

    pub fn get(&self, id: &ConflictId) -> Option<EnhancedSyncConflict> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Newest detection first; ties ordered by ID
    pub fn snapshot(&self) -> Vec<EnhancedSyncConflict> {
        let mut conflicts: Vec<_> = self.entries.read().values().cloned().collect();
        conflicts.sort_by(|a, b| {
            b.conflict
                .detected_at()
                .cmp(&a.conflict.detected_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        conflicts
    }

    /// Applies `update` to every conflict of the given type
    ///
    /// Returns the number of conflicts visited.
    pub fn update_type<F>(&self, conflict_type: &ConflictTypeKey, mut update: F) -> usize
    where
        F: FnMut(&mut EnhancedSyncConflict),
    {
        let mut entries = self.entries.write();
        let mut visited = 0;
        for conflict in entries.values_mut().filter(|c| &c.conflict_type == conflict_type) {
            update(conflict);
            visited += 1;
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tallysync_core::config::Config;
    use tallysync_core::domain::Resolution;

    use crate::classifier::Classifier;
    use crate::testing::raw_conflict;

    fn enhanced(entity: &str, field: &str, age_minutes: i64) -> EnhancedSyncConflict {
        let raw = raw_conflict(entity, json!({ field: "a" }), json!({ field: "b" }))
            .with_detected_at(Utc::now() - Duration::minutes(age_minutes));
        Classifier::from_config(&Config::default()).classify(&raw)
    }

    #[test]
    fn test_snapshot_orders_newest_first() {
        let set = OutstandingConflicts::new();
        let old = enhanced("transaction:1", "memo", 30);
        let new = enhanced("transaction:2", "memo", 1);
        set.replace_all(vec![old.clone(), new.clone()]);

        let ids: Vec<_> = set.snapshot().iter().map(|c| *c.id()).collect();
        assert_eq!(ids, vec![*new.id(), *old.id()]);
    }

    #[test]
    fn test_remove_is_single_shot() {
        let set = OutstandingConflicts::new();
        let conflict = enhanced("transaction:1", "memo", 0);
        set.replace_all(vec![conflict.clone()]);

        assert!(set.remove(conflict.id()).is_some());
        assert!(set.remove(conflict.id()).is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_update_type_touches_only_matching() {
        let set = OutstandingConflicts::new();
        set.replace_all(vec![
            enhanced("transaction:1", "memo", 0),
            enhanced("transaction:2", "memo", 0),
            enhanced("transaction:3", "payee", 0),
        ]);

        let memo = ConflictTypeKey::from_parts("data", ["memo"]);
        let visited = set.update_type(&memo, |c| c.suggested_resolution = Some(Resolution::Merge));

        assert_eq!(visited, 2);
        let merges = set
            .snapshot()
            .iter()
            .filter(|c| c.suggested_resolution == Some(Resolution::Merge))
            .count();
        assert_eq!(merges, 2);
    }
}
