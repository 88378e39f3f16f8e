//! CLI subcommands and the context they share

pub mod conflicts;
pub mod export;
pub mod prune;
pub mod stats;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use tallysync_cache::{DatabasePool, SqliteConflictStore};
use tallysync_conflict::ConflictService;
use tallysync_core::{config::Config, domain::SyncConflict, ports::IConflictSource};

use crate::output::OutputFormat;

/// Settings resolved from global flags and the config file
pub struct AppContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl AppContext {
    pub fn new(config: Config, format: OutputFormat) -> Self {
        Self { config, format }
    }

    pub fn database_path(&self) -> &Path {
        &self.config.storage.database_path
    }

    /// Opens the conflict database and builds the service over it
    pub async fn open_service(
        &self,
        source: Option<Arc<dyn IConflictSource>>,
    ) -> Result<ConflictService> {
        let pool = DatabasePool::from_config(&self.config.storage)
            .await
            .with_context(|| {
                format!(
                    "Failed to open conflict database at {}",
                    self.database_path().display()
                )
            })?;
        let store = Arc::new(SqliteConflictStore::new(pool.pool().clone()));
        Ok(ConflictService::new(store, source, &self.config))
    }
}

/// Conflict source backed by a JSON file holding an array of raw conflicts
///
/// Used by `conflicts import` to feed conflicts captured elsewhere (for
/// example by a transport's debug dump) into the local database.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IConflictSource for JsonFileSource {
    async fn fetch_outstanding(&self) -> anyhow::Result<Vec<SyncConflict>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let conflicts: Vec<SyncConflict> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid conflict file {}", self.path.display()))?;
        Ok(conflicts)
    }
}
