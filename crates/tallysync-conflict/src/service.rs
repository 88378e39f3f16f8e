//! Conflict service facade
//!
//! The single entry point for UI and automation layers. Wires the store,
//! the optional transport source and the engine together, and owns the
//! in-memory outstanding set that backs subscriptions.
//!
//! The service initialises lazily: every operation that needs loaded state
//! runs [`initialize`](ConflictService::initialize) first. Initialisation
//! happens at most once, however many callers race on it.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use tallysync_core::{
    config::Config,
    domain::{
        AutoResolveOutcome, BulkResolutionOptions, BulkResult, ConflictId,
        ConflictResolutionStats, EnhancedSyncConflict, Payload, Resolution, ResolutionActor,
        ResolutionRecord,
    },
    ports::{IConflictSource, IConflictStore},
};

use crate::{
    engine::ResolutionEngine,
    error::ConflictError,
    export::DiagnosticSnapshot,
    notifier::{ConflictObserver, ResolutionObserver, SubscriptionId},
    retention,
    stats::StatsAggregator,
};

/// Facade over the conflict engine
pub struct ConflictService {
    engine: ResolutionEngine,
    source: Option<Arc<dyn IConflictSource>>,
    stats: StatsAggregator,
    retention_days: u32,
    initialized: OnceCell<()>,
}

impl ConflictService {
    pub fn new(
        store: Arc<dyn IConflictStore>,
        source: Option<Arc<dyn IConflictSource>>,
        config: &Config,
    ) -> Self {
        Self {
            engine: ResolutionEngine::new(store, config),
            source,
            stats: StatsAggregator::new(&config.stats),
            retention_days: config.retention.resolved_max_age_days,
            initialized: OnceCell::new(),
        }
    }

    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    /// Loads learned patterns and the outstanding conflicts
    ///
    /// Idempotent: concurrent and repeated calls initialise once. A failed
    /// attempt is retried by the next call.
    pub async fn initialize(&self) -> Result<(), ConflictError> {
        self.initialized
            .get_or_try_init(|| async {
                let patterns = self.engine.store().list_patterns().await?;
                let pattern_count = patterns.len();
                self.engine.learner().load(patterns);

                let outstanding = self.sync_outstanding().await?;

                info!(
                    patterns = pattern_count,
                    outstanding = outstanding.len(),
                    "Conflict service initialized"
                );
                Ok::<(), ConflictError>(())
            })
            .await?;
        Ok(())
    }

    /// Pulls new conflicts from the transport and rebuilds the outstanding
    /// list, notifying conflict observers
    pub async fn refresh(&self) -> Result<Vec<EnhancedSyncConflict>, ConflictError> {
        if !self.initialized.initialized() {
            self.initialize().await?;
            return Ok(self.engine.outstanding().snapshot());
        }
        self.sync_outstanding().await
    }

    /// Outstanding conflicts, newest first
    pub async fn get_conflicts(&self) -> Result<Vec<EnhancedSyncConflict>, ConflictError> {
        self.initialize().await?;
        Ok(self.engine.outstanding().snapshot())
    }

    pub async fn get_conflict(
        &self,
        id: &ConflictId,
    ) -> Result<Option<EnhancedSyncConflict>, ConflictError> {
        self.initialize().await?;
        Ok(self.engine.outstanding().get(id))
    }

    /// Resolves an outstanding conflict on behalf of the user
    pub async fn resolve(
        &self,
        id: &ConflictId,
        resolution: Resolution,
        merged_payload: Option<Payload>,
    ) -> Result<ResolutionRecord, ConflictError> {
        self.initialize().await?;
        let conflict = self
            .engine
            .outstanding()
            .get(id)
            .ok_or(ConflictError::ConflictNotFound(*id))?;

        self.engine
            .resolve(&conflict, resolution, merged_payload, ResolutionActor::User)
            .await
    }

    pub async fn bulk_resolve(
        &self,
        conflicts: &[EnhancedSyncConflict],
        options: &BulkResolutionOptions,
    ) -> Result<BulkResult, ConflictError> {
        self.initialize().await?;
        Ok(self.engine.bulk_resolve(conflicts, options).await)
    }

    /// Bulk-resolves the current outstanding list
    pub async fn bulk_resolve_outstanding(
        &self,
        options: &BulkResolutionOptions,
    ) -> Result<BulkResult, ConflictError> {
        let conflicts = self.get_conflicts().await?;
        Ok(self.engine.bulk_resolve(&conflicts, options).await)
    }

    pub async fn auto_resolve(
        &self,
        conflicts: &[EnhancedSyncConflict],
    ) -> Result<AutoResolveOutcome, ConflictError> {
        self.initialize().await?;
        Ok(self.engine.auto_resolve(conflicts).await)
    }

    /// Auto-resolves the current outstanding list
    pub async fn auto_resolve_outstanding(&self) -> Result<AutoResolveOutcome, ConflictError> {
        let conflicts = self.get_conflicts().await?;
        Ok(self.engine.auto_resolve(&conflicts).await)
    }

    /// Current statistics
    ///
    /// Never fails: storage errors are logged and yield the zero-valued
    /// result.
    pub async fn get_stats(&self) -> ConflictResolutionStats {
        match self.compute_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Statistics unavailable, returning empty result");
                ConflictResolutionStats::empty()
            }
        }
    }

    pub fn subscribe_to_conflicts<O>(&self, observer: O) -> SubscriptionId
    where
        O: ConflictObserver + 'static,
    {
        self.engine.notifier().subscribe_conflicts(observer)
    }

    pub fn subscribe_to_resolutions<O>(&self, observer: O) -> SubscriptionId
    where
        O: ResolutionObserver + 'static,
    {
        self.engine.notifier().subscribe_resolutions(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.engine.notifier().unsubscribe(id)
    }

    /// Deletes resolution history older than `older_than_days`
    pub async fn prune_resolved(&self, older_than_days: u32) -> Result<u64, ConflictError> {
        retention::prune_resolved(&self.engine, older_than_days).await
    }

    /// Prunes with the configured retention period
    pub async fn prune_expired(&self) -> Result<u64, ConflictError> {
        self.prune_resolved(self.retention_days).await
    }

    /// Everything the engine knows, for diagnostics; never mutates state
    pub async fn snapshot(&self) -> Result<DiagnosticSnapshot, ConflictError> {
        self.initialize().await?;

        let history = self.engine.store().list_resolutions().await?;
        let outstanding = self.engine.outstanding().snapshot();
        let patterns = self.engine.learner().patterns();
        let stats = self
            .stats
            .compute(&history, &outstanding, patterns.clone());

        Ok(DiagnosticSnapshot {
            exported_at: Utc::now(),
            outstanding,
            history,
            patterns,
            stats,
        })
    }

    /// The diagnostic snapshot as pretty-printed JSON
    pub async fn export_all(&self) -> Result<String, ConflictError> {
        self.snapshot().await?.to_json()
    }

    async fn compute_stats(&self) -> Result<ConflictResolutionStats, ConflictError> {
        self.initialize().await?;
        let history = self.engine.store().list_resolutions().await?;
        let pending = self.engine.outstanding().snapshot();
        Ok(self
            .stats
            .compute(&history, &pending, self.engine.learner().patterns()))
    }

    /// Ingests from the source and reloads from the store, which notifies
    async fn sync_outstanding(&self) -> Result<Vec<EnhancedSyncConflict>, ConflictError> {
        if let Some(source) = &self.source {
            let reported = source.fetch_outstanding().await?;
            let mut inserted = 0usize;
            for conflict in &reported {
                if self.engine.store().save_conflict(conflict).await? {
                    inserted += 1;
                }
            }
            debug!(reported = reported.len(), inserted, "Ingested conflicts from source");
        }

        let outstanding = self.engine.reload().await?;

        info!(outstanding = outstanding.len(), "Conflict list refreshed");
        Ok(outstanding)
    }
}
