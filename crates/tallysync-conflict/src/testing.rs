//! Shared fixtures for unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use tallysync_cache::{DatabasePool, SqliteConflictStore};
use tallysync_core::{
    config::Config,
    domain::{
        ConflictId, EnhancedSyncConflict, EntityKey, Payload, ResolutionRecord, SyncConflict,
        UserResolutionPattern,
    },
    ports::{IConflictSource, IConflictStore},
};

use crate::engine::ResolutionEngine;

pub(crate) fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}

/// A conflict whose server copy was written one minute after the client copy
pub(crate) fn raw_conflict(entity: &str, client: Value, server: Value) -> SyncConflict {
    let now = Utc::now();
    SyncConflict::new(
        entity.parse().expect("valid entity key"),
        payload(client),
        payload(server),
        now - Duration::minutes(1),
        now,
    )
}

pub(crate) async fn sqlite_store() -> Arc<SqliteConflictStore> {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    Arc::new(SqliteConflictStore::new(pool.pool().clone()))
}

/// Store wrapper that fails selected operations on demand
pub(crate) struct FlakyStore {
    inner: Arc<dyn IConflictStore>,
    failing_entities: Mutex<HashSet<EntityKey>>,
    fail_patterns: AtomicBool,
    fail_history: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new(inner: Arc<dyn IConflictStore>) -> Self {
        Self {
            inner,
            failing_entities: Mutex::new(HashSet::new()),
            fail_patterns: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_commits_for(&self, entity: &EntityKey) {
        self.failing_entities.lock().insert(entity.clone());
    }

    pub(crate) fn fail_pattern_writes(&self) {
        self.fail_patterns.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_history_reads(&self) {
        self.fail_history.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl IConflictStore for FlakyStore {
    async fn save_conflict(&self, conflict: &SyncConflict) -> anyhow::Result<bool> {
        self.inner.save_conflict(conflict).await
    }

    async fn get_conflict(&self, id: &ConflictId) -> anyhow::Result<Option<SyncConflict>> {
        self.inner.get_conflict(id).await
    }

    async fn list_outstanding(&self) -> anyhow::Result<Vec<SyncConflict>> {
        self.inner.list_outstanding().await
    }

    async fn get_resolution(&self, id: &ConflictId) -> anyhow::Result<Option<ResolutionRecord>> {
        self.inner.get_resolution(id).await
    }

    async fn commit_resolution(
        &self,
        record: &ResolutionRecord,
        payload: &Payload,
    ) -> anyhow::Result<()> {
        if self.failing_entities.lock().contains(&record.entity) {
            anyhow::bail!("injected write failure for {}", record.entity);
        }
        self.inner.commit_resolution(record, payload).await
    }

    async fn list_resolutions(&self) -> anyhow::Result<Vec<ResolutionRecord>> {
        if self.fail_history.load(Ordering::SeqCst) {
            anyhow::bail!("injected read failure");
        }
        self.inner.list_resolutions().await
    }

    async fn prune_resolutions(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        self.inner.prune_resolutions(cutoff).await
    }

    async fn get_entity(&self, key: &EntityKey) -> anyhow::Result<Option<Payload>> {
        self.inner.get_entity(key).await
    }

    async fn save_pattern(&self, pattern: &UserResolutionPattern) -> anyhow::Result<()> {
        if self.fail_patterns.load(Ordering::SeqCst) {
            anyhow::bail!("injected pattern write failure");
        }
        self.inner.save_pattern(pattern).await
    }

    async fn list_patterns(&self) -> anyhow::Result<Vec<UserResolutionPattern>> {
        self.inner.list_patterns().await
    }
}

/// Transport stand-in that reports a fixed list of conflicts
pub(crate) struct StaticSource {
    conflicts: Mutex<Vec<SyncConflict>>,
    fetches: AtomicUsize,
}

impl StaticSource {
    pub(crate) fn new(conflicts: Vec<SyncConflict>) -> Self {
        Self {
            conflicts: Mutex::new(conflicts),
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, conflict: SyncConflict) {
        self.conflicts.lock().push(conflict);
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IConflictSource for StaticSource {
    async fn fetch_outstanding(&self) -> anyhow::Result<Vec<SyncConflict>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.conflicts.lock().clone())
    }
}

/// Engine over an in-memory SQLite store wrapped in a [`FlakyStore`]
pub(crate) struct Harness {
    pub(crate) store: Arc<FlakyStore>,
    pub(crate) engine: ResolutionEngine,
}

impl Harness {
    pub(crate) async fn with_conflicts(conflicts: Vec<SyncConflict>) -> Self {
        Self::with_config(conflicts, Config::default()).await
    }

    pub(crate) async fn with_config(conflicts: Vec<SyncConflict>, config: Config) -> Self {
        let store = Arc::new(FlakyStore::new(sqlite_store().await));
        for conflict in &conflicts {
            store.save_conflict(conflict).await.expect("save conflict");
        }

        let engine = ResolutionEngine::new(store.clone(), &config);
        engine.reload().await.expect("reload outstanding conflicts");

        Self { store, engine }
    }

    pub(crate) fn outstanding(&self) -> Vec<EnhancedSyncConflict> {
        self.engine.outstanding().snapshot()
    }
}
