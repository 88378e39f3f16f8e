//! Change notification for UI layers
//!
//! Two kinds of observers exist: conflict-list observers receive the full
//! outstanding list whenever it changes, resolution observers receive one
//! event per committed resolution. Delivery is synchronous and in
//! registration order. An observer that panics is logged and skipped; the
//! remaining observers still receive the notification.
//!
//! The observer list is snapshotted before delivery, so an observer may
//! subscribe or unsubscribe (itself or others) from inside its callback
//! without deadlocking. Such changes take effect from the next delivery.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use tallysync_core::domain::{EnhancedSyncConflict, ResolutionRecord};

/// Handle returned by `subscribe_*`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A committed resolution together with the conflict it resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEvent {
    pub record: ResolutionRecord,
    pub conflict: EnhancedSyncConflict,
}

/// Receives the outstanding conflict list after every change
pub trait ConflictObserver: Send + Sync {
    fn on_conflicts_changed(&self, conflicts: &[EnhancedSyncConflict]);
}

/// Receives every committed resolution
pub trait ResolutionObserver: Send + Sync {
    fn on_resolution(&self, event: &ResolutionEvent);
}

impl<F> ConflictObserver for F
where
    F: Fn(&[EnhancedSyncConflict]) + Send + Sync,
{
    fn on_conflicts_changed(&self, conflicts: &[EnhancedSyncConflict]) {
        self(conflicts)
    }
}

impl<F> ResolutionObserver for F
where
    F: Fn(&ResolutionEvent) + Send + Sync,
{
    fn on_resolution(&self, event: &ResolutionEvent) {
        self(event)
    }
}

/// Observer registry
#[derive(Default)]
pub struct Notifier {
    next_id: AtomicU64,
    conflict_observers: Mutex<Vec<(SubscriptionId, Arc<dyn ConflictObserver>)>>,
    resolution_observers: Mutex<Vec<(SubscriptionId, Arc<dyn ResolutionObserver>)>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_conflicts<O>(&self, observer: O) -> SubscriptionId
    where
        O: ConflictObserver + 'static,
    {
        let id = self.allocate_id();
        self.conflict_observers.lock().push((id, Arc::new(observer)));
        trace!(subscription = %id, "Conflict observer subscribed");
        id
    }

    pub fn subscribe_resolutions<O>(&self, observer: O) -> SubscriptionId
    where
        O: ResolutionObserver + 'static,
    {
        let id = self.allocate_id();
        self.resolution_observers.lock().push((id, Arc::new(observer)));
        trace!(subscription = %id, "Resolution observer subscribed");
        id
    }

    /// Removes an observer of either kind
    ///
    /// Returns false if the subscription was unknown or already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut observers = self.conflict_observers.lock();
            let before = observers.len();
            observers.retain(|(sub, _)| *sub != id);
            before != observers.len()
        } || {
            let mut observers = self.resolution_observers.lock();
            let before = observers.len();
            observers.retain(|(sub, _)| *sub != id);
            before != observers.len()
        };

        trace!(subscription = %id, removed, "Unsubscribe");
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.conflict_observers.lock().len() + self.resolution_observers.lock().len()
    }

    pub fn notify_conflicts_changed(&self, conflicts: &[EnhancedSyncConflict]) {
        let observers = self.conflict_observers.lock().clone();
        for (id, observer) in observers {
            let result = catch_unwind(AssertUnwindSafe(|| observer.on_conflicts_changed(conflicts)));
            if result.is_err() {
                warn!(subscription = %id, "Conflict observer panicked; continuing delivery");
            }
        }
    }

    pub fn notify_resolution(&self, event: &ResolutionEvent) {
        let observers = self.resolution_observers.lock().clone();
        for (id, observer) in observers {
            let result = catch_unwind(AssertUnwindSafe(|| observer.on_resolution(event)));
            if result.is_err() {
                warn!(
                    subscription = %id,
                    conflict_id = %event.record.conflict_id,
                    "Resolution observer panicked; continuing delivery"
                );
            }
        }
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}
