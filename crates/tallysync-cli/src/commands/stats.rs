//! Stats command - Summarise resolution activity

use anyhow::Result;
use clap::Args;

use tallysync_core::domain::ConflictResolutionStats;

use super::AppContext;
use crate::output::{format_duration_ms, get_formatter, percent, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Also list learned resolution patterns
    #[arg(long)]
    patterns: bool,
}

impl StatsCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let service = ctx.open_service(None).await?;
        let stats = service.get_stats().await;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::to_value(&stats)?);
            return Ok(());
        }

        print_summary(&stats, &*formatter);
        if self.patterns {
            print_patterns(&stats, &*formatter);
        }
        Ok(())
    }
}

fn print_summary(stats: &ConflictResolutionStats, formatter: &dyn OutputFormatter) {
    formatter.success(&format!(
        "{} conflicts seen, {} resolved, {} pending",
        stats.total_conflicts, stats.resolved_conflicts, stats.pending_conflicts
    ));
    formatter.info(&format!(
        "Resolved by user: {}  automatically: {}",
        stats.user_resolved_conflicts, stats.auto_resolved_conflicts
    ));
    formatter.info(&format!(
        "Resolution rate:  {}",
        percent(stats.resolution_success_rate)
    ));
    formatter.info(&format!(
        "Average time:     {}",
        format_duration_ms(stats.average_resolution_time_ms)
    ));

    if !stats.common_conflict_types.is_empty() {
        formatter.info("");
        formatter.info("Most common conflict types:");
        for entry in &stats.common_conflict_types {
            formatter.info(&format!(
                "  {:>4}  {}  (last {})",
                entry.count,
                entry.conflict_type,
                entry.last_seen.format("%Y-%m-%d")
            ));
        }
    }
}

fn print_patterns(stats: &ConflictResolutionStats, formatter: &dyn OutputFormatter) {
    formatter.info("");
    if stats.user_patterns.is_empty() {
        formatter.info("No resolution patterns learned yet");
        return;
    }
    formatter.info("Learned patterns:");
    for pattern in &stats.user_patterns {
        formatter.info(&format!(
            "  {}  -> {} ({}, {} samples)",
            pattern.conflict_type,
            pattern.preferred_resolution,
            percent(pattern.confidence),
            pattern.sample_size
        ));
    }
}
