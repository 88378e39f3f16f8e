//! Prune command - Apply the resolution history retention policy

use anyhow::{Context, Result};
use clap::Args;

use super::AppContext;
use crate::output::{get_formatter, plural};

#[derive(Debug, Args)]
pub struct PruneCommand {
    /// Delete history older than this many days (defaults to the configured retention)
    #[arg(long)]
    days: Option<u32>,
}

impl PruneCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let service = ctx.open_service(None).await?;

        let days = self.days.unwrap_or(ctx.config.retention.resolved_max_age_days);
        let pruned = service
            .prune_resolved(days)
            .await
            .context("Failed to prune resolution history")?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "older_than_days": days,
                "pruned": pruned,
            }));
        } else {
            formatter.success(&format!(
                "Pruned {} older than {days} days",
                plural(pruned as usize, "resolution")
            ));
        }
        Ok(())
    }
}
