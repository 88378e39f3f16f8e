//! Export command - Dump engine state for diagnostics

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::AppContext;
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Write the snapshot to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl ExportCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let service = ctx.open_service(None).await?;
        let json = service
            .export_all()
            .await
            .context("Failed to build diagnostic snapshot")?;

        match &self.output {
            Some(path) => {
                tokio::fs::write(path, json.as_bytes())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!(path = %path.display(), "Diagnostic snapshot written");
                get_formatter(ctx.format)
                    .success(&format!("Snapshot written to {}", path.display()));
            }
            // The snapshot is already JSON, so it goes to stdout as-is in both formats
            None => println!("{json}"),
        }
        Ok(())
    }
}
