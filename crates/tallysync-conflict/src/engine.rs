//! Resolution engine
//!
//! Owns the mutation path for conflicts: single resolutions, bulk
//! resolutions and automatic resolution. Every commit follows the same
//! sequence:
//!
//! 1. Validate the request (merge payload present, conflict still outstanding)
//!    and classify the stored conflict again
//! 2. Write the winning payload and the history record in one store call
//! 3. Drop the conflict from the outstanding set
//! 4. Feed the learner and refresh suggestions for the same conflict type
//! 5. Notify observers
//!
//! Mutations are serialized through a single async lock. Bulk and automatic
//! passes take the lock per item, so they never hold it across the whole
//! batch and a failure in one item never aborts the rest.
//!
//! A conflict passed in by a caller only names what to resolve. Payloads,
//! severity, protected fields and suggestions always come from the engine's
//! own classification of the stored conflict.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use tallysync_core::{
    config::Config,
    domain::{
        AutoResolveOutcome, BulkResolutionOptions, BulkResult, BulkStrategy, ConflictId,
        EnhancedSyncConflict, Payload, Resolution, ResolutionActor, ResolutionRecord, SyncConflict,
    },
    ports::IConflictStore,
};

use crate::{
    classifier::Classifier,
    error::ConflictError,
    learner::PatternLearner,
    merge::merge_by_rule,
    notifier::{Notifier, ResolutionEvent},
    outstanding::OutstandingConflicts,
};

/// Applies resolutions and keeps the outstanding set, the learner and
/// observers in step with the store
pub struct ResolutionEngine {
    store: Arc<dyn IConflictStore>,
    classifier: Classifier,
    learner: PatternLearner,
    outstanding: OutstandingConflicts,
    notifier: Notifier,
    mutation_lock: Mutex<()>,
}

impl ResolutionEngine {
    pub fn new(store: Arc<dyn IConflictStore>, config: &Config) -> Self {
        Self {
            store,
            classifier: Classifier::from_config(config),
            learner: PatternLearner::new(&config.learning),
            outstanding: OutstandingConflicts::new(),
            notifier: Notifier::new(),
            mutation_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn IConflictStore> {
        &self.store
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn learner(&self) -> &PatternLearner {
        &self.learner
    }

    pub fn outstanding(&self) -> &OutstandingConflicts {
        &self.outstanding
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Waits for in-flight mutations and blocks new ones while held
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutation_lock.lock().await
    }

    /// Rebuilds the outstanding set from the store and publishes it
    ///
    /// Every conflict without a resolution record is classified again and
    /// given the learner's current suggestion. Conflict observers receive
    /// the new list before the mutation lock is released.
    pub async fn reload(&self) -> Result<Vec<EnhancedSyncConflict>, ConflictError> {
        let _guard = self.lock().await;

        let raw = self.store.list_outstanding().await?;
        let classified: Vec<EnhancedSyncConflict> =
            raw.iter().map(|conflict| self.enhance(conflict)).collect();

        self.outstanding.replace_all(classified);
        let snapshot = self.outstanding.snapshot();

        debug!(outstanding = snapshot.len(), "Outstanding conflicts reloaded");
        self.notifier.notify_conflicts_changed(&snapshot);
        Ok(snapshot)
    }

    /// Resolves one conflict
    ///
    /// # Errors
    ///
    /// - [`ConflictError::InvalidMergePayload`] for a merge without payload
    /// - [`ConflictError::ConflictNotFound`] if the conflict is unknown or
    ///   already resolved
    /// - [`ConflictError::Persistence`] if the store rejects the commit
    pub async fn resolve(
        &self,
        conflict: &EnhancedSyncConflict,
        resolution: Resolution,
        merged_payload: Option<Payload>,
        actor: ResolutionActor,
    ) -> Result<ResolutionRecord, ConflictError> {
        let _guard = self.lock().await;
        let current = self.current(conflict.id()).await?;
        self.commit(&current, resolution, merged_payload, actor).await
    }

    /// Applies one strategy to every selected conflict, in input order
    ///
    /// Conflicts rejected by the filter, and conflicts without a suggestion
    /// under [`BulkStrategy::ApplySuggestions`], are skipped. Individual
    /// failures are counted and reported but never abort the batch.
    pub async fn bulk_resolve(
        &self,
        conflicts: &[EnhancedSyncConflict],
        options: &BulkResolutionOptions,
    ) -> BulkResult {
        let mut result = BulkResult::default();

        for conflict in conflicts {
            if !options.selects(conflict) {
                result.skipped += 1;
                continue;
            }

            let outcome = {
                let _guard = self.lock().await;
                self.bulk_item(conflict.id(), options).await
            };

            match outcome {
                Ok(true) => result.resolved += 1,
                Ok(false) => {
                    debug!(conflict_id = %conflict.id(), "No suggestion available, skipping");
                    result.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        conflict_id = %conflict.id(),
                        strategy = %options.strategy,
                        error = %e,
                        "Bulk resolution failed for conflict"
                    );
                    result.failed += 1;
                    result.errors.push(format!("{}: {e}", conflict.id()));
                }
            }
        }

        info!(
            strategy = %options.strategy,
            dry_run = options.dry_run,
            resolved = result.resolved,
            failed = result.failed,
            skipped = result.skipped,
            "Bulk resolution finished"
        );

        result
    }

    /// Applies each safe conflict's suggested resolution
    ///
    /// Only conflicts the engine itself classifies as auto-resolvable, of
    /// low or medium severity and free of protected-field changes are
    /// touched. Everything else, including conflicts whose commit fails, is
    /// returned in `remaining`.
    pub async fn auto_resolve(&self, conflicts: &[EnhancedSyncConflict]) -> AutoResolveOutcome {
        let mut outcome = AutoResolveOutcome::default();

        for conflict in conflicts {
            let _guard = self.lock().await;

            let current = match self.current(conflict.id()).await {
                Ok(current) => current,
                Err(e) => {
                    debug!(conflict_id = %conflict.id(), error = %e, "Skipping automatic resolution");
                    outcome.remaining.push(conflict.clone());
                    continue;
                }
            };

            let eligible = current.auto_resolvable
                && current.severity.permits_auto_resolution()
                && !current.touches_protected_field();
            let plan = if eligible {
                self.plan(&current, BulkStrategy::ApplySuggestions)
            } else {
                None
            };

            let Some((resolution, merged)) = plan else {
                outcome.remaining.push(current);
                continue;
            };

            match self
                .commit(&current, resolution, merged, ResolutionActor::Auto)
                .await
            {
                Ok(_) => outcome.resolved.push(current),
                Err(e) => {
                    warn!(
                        conflict_id = %current.id(),
                        error = %e,
                        "Automatic resolution failed, leaving conflict outstanding"
                    );
                    outcome.remaining.push(current);
                }
            }
        }

        info!(
            resolved = outcome.resolved.len(),
            remaining = outcome.remaining.len(),
            "Automatic resolution finished"
        );

        outcome
    }

    /// One bulk item under the lock; `Ok(false)` means skipped
    async fn bulk_item(
        &self,
        id: &ConflictId,
        options: &BulkResolutionOptions,
    ) -> Result<bool, ConflictError> {
        let current = self.current(id).await?;
        let Some((resolution, merged)) = self.plan(&current, options.strategy) else {
            return Ok(false);
        };
        if !options.dry_run {
            self.commit(&current, resolution, merged, ResolutionActor::User)
                .await?;
        }
        Ok(true)
    }

    /// Maps a strategy onto a concrete resolution for one conflict
    fn plan(
        &self,
        conflict: &EnhancedSyncConflict,
        strategy: BulkStrategy,
    ) -> Option<(Resolution, Option<Payload>)> {
        let resolution = match strategy {
            BulkStrategy::ClientWins => Resolution::Client,
            BulkStrategy::ServerWins => Resolution::Server,
            BulkStrategy::MergeByRule => Resolution::Merge,
            BulkStrategy::ApplySuggestions => conflict.suggested_resolution?,
        };

        let merged = match resolution {
            Resolution::Merge => Some(merge_by_rule(conflict, &self.classifier)),
            Resolution::Client | Resolution::Server => None,
        };

        Some((resolution, merged))
    }

    /// Classifies a raw conflict and applies the learner's suggestion
    fn enhance(&self, raw: &SyncConflict) -> EnhancedSyncConflict {
        let mut enhanced = self.classifier.classify(raw);
        let learned = self.learner.suggest(&enhanced.conflict_type);
        self.classifier.refine_suggestion(&mut enhanced, learned);
        enhanced
    }

    /// The engine's own view of an outstanding conflict, rebuilt from the
    /// stored raw conflict; the caller holds the lock
    async fn current(&self, id: &ConflictId) -> Result<EnhancedSyncConflict, ConflictError> {
        let raw = self
            .store
            .get_conflict(id)
            .await?
            .ok_or(ConflictError::ConflictNotFound(*id))?;
        if self.store.get_resolution(id).await?.is_some() {
            return Err(ConflictError::ConflictNotFound(*id));
        }
        Ok(self.enhance(&raw))
    }

    /// Commit path shared by every mutation
    ///
    /// `conflict` must come from [`current`](Self::current) under the lock
    /// the caller still holds.
    async fn commit(
        &self,
        conflict: &EnhancedSyncConflict,
        resolution: Resolution,
        merged_payload: Option<Payload>,
        actor: ResolutionActor,
    ) -> Result<ResolutionRecord, ConflictError> {
        let id = *conflict.id();

        let payload = match resolution {
            Resolution::Client => conflict.conflict.client_payload().clone(),
            Resolution::Server => conflict.conflict.server_payload().clone(),
            Resolution::Merge => merged_payload
                .clone()
                .ok_or(ConflictError::InvalidMergePayload(id))?,
        };

        let record = ResolutionRecord::new(
            &conflict.conflict,
            conflict.conflict_type.clone(),
            resolution,
            merged_payload,
            actor,
        );
        self.store.commit_resolution(&record, &payload).await?;
        self.outstanding.remove(&id);

        info!(
            conflict_id = %id,
            entity = %record.entity,
            resolution = %resolution,
            actor = %actor,
            "Conflict resolved"
        );

        self.learn(&record).await;

        self.notifier.notify_resolution(&ResolutionEvent {
            record: record.clone(),
            conflict: conflict.clone(),
        });
        self.notifier
            .notify_conflicts_changed(&self.outstanding.snapshot());

        Ok(record)
    }

    async fn learn(&self, record: &ResolutionRecord) {
        let Some(pattern) =
            self.learner
                .record_choice(&record.conflict_type, record.resolution, record.actor)
        else {
            return;
        };

        if let Err(e) = self.store.save_pattern(&pattern).await {
            warn!(
                conflict_type = %pattern.conflict_type,
                error = %e,
                "Failed to persist resolution pattern"
            );
        }

        let learned = self.learner.suggest(&record.conflict_type);
        self.outstanding.update_type(&record.conflict_type, |c| {
            self.classifier.refine_suggestion(c, learned)
        });
    }
}
