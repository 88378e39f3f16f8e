//! Conflicts command - Inspect and resolve outstanding conflicts
//!
//! Provides the `tallysync conflicts` subcommands:
//! 1. `list` shows the outstanding conflicts, newest first
//! 2. `show` prints the field diff and suggestion for one conflict
//! 3. `resolve`, `bulk` and `auto` commit resolutions
//! 4. `import` ingests raw conflicts from a JSON file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use tallysync_conflict::merge_by_rule;
use tallysync_core::domain::{
    BulkResolutionOptions, BulkStrategy, ConflictCategory, ConflictFilter, EnhancedSyncConflict,
    Payload, Resolution, Severity,
};

use super::{AppContext, JsonFileSource};
use crate::output::{get_formatter, percent, plural, short_id, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum ConflictsCommand {
    /// List outstanding conflicts
    List,
    /// Show the details of one conflict
    Show {
        /// Conflict ID or a unique prefix of it
        id: String,
    },
    /// Resolve one conflict
    Resolve {
        /// Conflict ID or a unique prefix of it
        id: String,
        /// Winning side: client, server or merge
        #[arg(long = "with")]
        resolution: Resolution,
        /// Merged payload as a JSON object (merge only; defaults to the field merge rule)
        #[arg(long)]
        payload: Option<String>,
    },
    /// Resolve every matching conflict with one strategy
    Bulk {
        /// client-wins, server-wins, merge-by-rule or apply-suggestions
        #[arg(long)]
        strategy: BulkStrategy,
        /// Only conflicts in these categories
        #[arg(long, value_delimiter = ',')]
        category: Vec<ConflictCategory>,
        /// Only conflicts with these severities
        #[arg(long, value_delimiter = ',')]
        severity: Vec<Severity>,
        /// Only conflicts on these entity tables
        #[arg(long, value_delimiter = ',')]
        table: Vec<String>,
        /// Report what would happen without committing
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply suggestions to every low-risk conflict
    Auto,
    /// Ingest raw conflicts from a JSON file
    Import {
        /// File holding an array of conflicts
        file: PathBuf,
    },
}

impl ConflictsCommand {
    pub async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        match self {
            ConflictsCommand::List => execute_list(ctx, &*formatter).await,
            ConflictsCommand::Show { id } => execute_show(ctx, id, &*formatter).await,
            ConflictsCommand::Resolve {
                id,
                resolution,
                payload,
            } => execute_resolve(ctx, id, *resolution, payload.as_deref(), &*formatter).await,
            ConflictsCommand::Bulk {
                strategy,
                category,
                severity,
                table,
                dry_run,
            } => {
                let options = bulk_options(*strategy, category, severity, table, *dry_run);
                execute_bulk(ctx, &options, &*formatter).await
            }
            ConflictsCommand::Auto => execute_auto(ctx, &*formatter).await,
            ConflictsCommand::Import { file } => execute_import(ctx, file, &*formatter).await,
        }
    }
}

async fn execute_list(ctx: &AppContext, formatter: &dyn OutputFormatter) -> Result<()> {
    let service = ctx.open_service(None).await?;
    let conflicts = service
        .get_conflicts()
        .await
        .context("Failed to load outstanding conflicts")?;

    info!(count = conflicts.len(), "Retrieved outstanding conflicts");

    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "count": conflicts.len(),
            "conflicts": conflicts,
        }));
        return Ok(());
    }

    if conflicts.is_empty() {
        formatter.success("No outstanding conflicts");
        return Ok(());
    }

    formatter.success(&format!("{} outstanding", plural(conflicts.len(), "conflict")));
    formatter.info("");
    formatter.info("ID        Entity                Category       Severity  Suggestion");
    formatter.info("--------  --------------------  -------------  --------  ----------------");
    for conflict in &conflicts {
        let id = conflict.id().to_string();
        formatter.info(&format!(
            "{:<8}  {:<20}  {:<13}  {:<8}  {}",
            short_id(&id),
            conflict.entity().to_string(),
            conflict.category.as_str(),
            conflict.severity.as_str(),
            suggestion_label(conflict),
        ));
    }
    Ok(())
}

async fn execute_show(ctx: &AppContext, id: &str, formatter: &dyn OutputFormatter) -> Result<()> {
    let service = ctx.open_service(None).await?;
    let conflicts = service.get_conflicts().await?;
    let conflict = find_by_prefix(&conflicts, id)?;

    if ctx.format.is_json() {
        formatter.print_json(&serde_json::to_value(conflict)?);
        return Ok(());
    }

    formatter.success(&format!("Conflict {}", conflict.id()));
    formatter.info(&format!("Entity:      {}", conflict.entity()));
    formatter.info(&format!("Category:    {}", conflict.category));
    formatter.info(&format!("Severity:    {}", conflict.severity));
    formatter.info(&format!("Type:        {}", conflict.conflict_type));
    formatter.info(&format!(
        "Detected:    {}",
        conflict.conflict.detected_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    formatter.info(&format!("Suggestion:  {}", suggestion_label(conflict)));
    if conflict.touches_protected_field() {
        formatter.warn(&format!(
            "Protected fields changed: {}",
            conflict.protected_fields.join(", ")
        ));
    }
    formatter.info("");
    for diff in conflict.diff.iter().filter(|d| d.changed) {
        formatter.info(&format!(
            "{}: client={} server={}",
            diff.field,
            render_value(diff.client_value.as_ref()),
            render_value(diff.server_value.as_ref()),
        ));
    }
    Ok(())
}

async fn execute_resolve(
    ctx: &AppContext,
    id: &str,
    resolution: Resolution,
    payload: Option<&str>,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    if payload.is_some() && resolution != Resolution::Merge {
        bail!("--payload is only accepted with --with merge");
    }

    let service = ctx.open_service(None).await?;
    let conflicts = service.get_conflicts().await?;
    let conflict = find_by_prefix(&conflicts, id)?;

    let merged = match (resolution, payload) {
        (Resolution::Merge, Some(raw)) => Some(parse_payload(raw)?),
        (Resolution::Merge, None) => {
            Some(merge_by_rule(conflict, service.engine().classifier()))
        }
        _ => None,
    };

    let record = service
        .resolve(conflict.id(), resolution, merged)
        .await
        .with_context(|| format!("Failed to resolve conflict {}", conflict.id()))?;

    if ctx.format.is_json() {
        formatter.print_json(&serde_json::to_value(&record)?);
    } else {
        formatter.success(&format!(
            "Resolved {} on {} with {}",
            short_id(&record.conflict_id.to_string()),
            record.entity,
            record.resolution
        ));
    }
    Ok(())
}

async fn execute_bulk(
    ctx: &AppContext,
    options: &BulkResolutionOptions,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    let service = ctx.open_service(None).await?;
    let result = service.bulk_resolve_outstanding(options).await?;

    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({
            "strategy": options.strategy.as_str(),
            "dry_run": options.dry_run,
            "result": result,
        }));
        return Ok(());
    }

    let verb = if options.dry_run { "Would resolve" } else { "Resolved" };
    formatter.success(&format!(
        "{verb} {} with {} ({} failed, {} skipped)",
        plural(result.resolved as usize, "conflict"),
        options.strategy,
        result.failed,
        result.skipped
    ));
    for error in &result.errors {
        formatter.warn(error);
    }
    Ok(())
}

async fn execute_auto(ctx: &AppContext, formatter: &dyn OutputFormatter) -> Result<()> {
    let service = ctx.open_service(None).await?;
    let outcome = service.auto_resolve_outstanding().await?;

    if ctx.format.is_json() {
        let resolved: Vec<String> = outcome.resolved.iter().map(|c| c.id().to_string()).collect();
        let remaining: Vec<String> = outcome.remaining.iter().map(|c| c.id().to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "resolved": resolved,
            "remaining": remaining,
        }));
        return Ok(());
    }

    formatter.success(&format!(
        "Auto-resolved {}; {} need review",
        plural(outcome.resolved.len(), "conflict"),
        outcome.remaining.len()
    ));
    for conflict in &outcome.resolved {
        formatter.info(&format!(
            "{}  {}",
            short_id(&conflict.id().to_string()),
            conflict.entity()
        ));
    }
    Ok(())
}

async fn execute_import(
    ctx: &AppContext,
    file: &Path,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    let source = Arc::new(JsonFileSource::new(file));
    let service = ctx.open_service(Some(source)).await?;
    let conflicts = service
        .refresh()
        .await
        .with_context(|| format!("Failed to import conflicts from {}", file.display()))?;

    if ctx.format.is_json() {
        formatter.print_json(&serde_json::json!({ "outstanding": conflicts.len() }));
    } else {
        formatter.success(&format!(
            "Import complete; {} outstanding",
            plural(conflicts.len(), "conflict")
        ));
    }
    Ok(())
}

/// Builds bulk options; empty filter lists mean "no restriction"
fn bulk_options(
    strategy: BulkStrategy,
    categories: &[ConflictCategory],
    severities: &[Severity],
    tables: &[String],
    dry_run: bool,
) -> BulkResolutionOptions {
    let mut filter = ConflictFilter::new();
    if !categories.is_empty() {
        filter = filter.with_categories(categories.iter().copied());
    }
    if !severities.is_empty() {
        filter = filter.with_severities(severities.iter().copied());
    }
    if !tables.is_empty() {
        filter = filter.with_tables(tables.iter().cloned());
    }

    let mut options = BulkResolutionOptions::new(strategy);
    if !filter.is_empty() {
        options = options.with_filter(filter);
    }
    if dry_run {
        options = options.dry_run();
    }
    options
}

/// Finds the single conflict whose ID starts with `prefix`
fn find_by_prefix<'a>(
    conflicts: &'a [EnhancedSyncConflict],
    prefix: &str,
) -> Result<&'a EnhancedSyncConflict> {
    let prefix = prefix.trim().to_ascii_lowercase();
    if prefix.is_empty() {
        bail!("Conflict ID must not be empty");
    }

    let mut matches = conflicts
        .iter()
        .filter(|c| c.id().to_string().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(conflict), None) => Ok(conflict),
        (None, _) => bail!("No outstanding conflict matches '{prefix}'"),
        (Some(_), Some(_)) => bail!("'{prefix}' matches more than one conflict"),
    }
}

fn parse_payload(raw: &str) -> Result<Payload> {
    serde_json::from_str::<Payload>(raw).context("--payload must be a JSON object")
}

fn suggestion_label(conflict: &EnhancedSyncConflict) -> String {
    match conflict.suggested_resolution {
        Some(resolution) => format!(
            "{} ({})",
            resolution,
            percent(conflict.suggestion_confidence)
        ),
        None => "-".to_string(),
    }
}

fn render_value(value: Option<&serde_json::Value>) -> String {
    value.map_or_else(|| "<absent>".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tallysync_conflict::Classifier;
    use tallysync_core::config::Config;
    use tallysync_core::domain::SyncConflict;

    fn enhanced(entity: &str) -> EnhancedSyncConflict {
        let now = Utc::now();
        let raw = SyncConflict::new(
            entity.parse().unwrap(),
            json!({"memo": "coffee"}).as_object().cloned().unwrap(),
            json!({"memo": "lunch"}).as_object().cloned().unwrap(),
            now,
            now + chrono::Duration::minutes(1),
        );
        Classifier::from_config(&Config::default()).classify(&raw)
    }

    fn with_id(mut conflict: EnhancedSyncConflict, id: &str) -> EnhancedSyncConflict {
        conflict.conflict = conflict.conflict.with_id(id.parse().unwrap());
        conflict
    }

    #[test]
    fn test_find_by_prefix_unique_match() {
        let conflicts = vec![enhanced("transaction:1"), enhanced("transaction:2")];
        let full = conflicts[1].id().to_string();

        let found = find_by_prefix(&conflicts, &full).unwrap();
        assert_eq!(found.id(), conflicts[1].id());
    }

    #[test]
    fn test_find_by_prefix_rejects_empty_and_unknown() {
        let conflicts = vec![enhanced("transaction:1")];
        assert!(find_by_prefix(&conflicts, "  ").is_err());
        assert!(find_by_prefix(&conflicts, "zzzz").is_err());
    }

    #[test]
    fn test_find_by_prefix_rejects_ambiguous() {
        let conflicts = vec![
            with_id(enhanced("transaction:1"), "5f0e6a10-0000-4000-8000-000000000001"),
            with_id(enhanced("transaction:2"), "5f0e6a10-0000-4000-8000-000000000002"),
        ];
        assert!(find_by_prefix(&conflicts, "5f0e6a10").is_err());
        assert_eq!(
            find_by_prefix(&conflicts, "5F0E6A10-0000-4000-8000-000000000002")
                .unwrap()
                .entity()
                .to_string(),
            "transaction:2"
        );
    }

    #[test]
    fn test_parse_payload_requires_object() {
        assert_eq!(
            parse_payload(r#"{"memo": "both"}"#).unwrap().get("memo"),
            Some(&json!("both"))
        );
        assert!(parse_payload("[1, 2]").is_err());
        assert!(parse_payload("not json").is_err());
    }

    #[test]
    fn test_bulk_options_without_filters() {
        let options = bulk_options(BulkStrategy::ServerWins, &[], &[], &[], false);
        assert_eq!(options.strategy, BulkStrategy::ServerWins);
        assert!(options.filter.is_none());
        assert!(!options.dry_run);
    }

    #[test]
    fn test_bulk_options_with_filters() {
        let options = bulk_options(
            BulkStrategy::MergeByRule,
            &[ConflictCategory::Data],
            &[Severity::Low, Severity::Medium],
            &["transaction".to_string()],
            true,
        );
        let filter = options.filter.unwrap();
        assert_eq!(filter.categories, Some(vec![ConflictCategory::Data]));
        assert_eq!(filter.severities, Some(vec![Severity::Low, Severity::Medium]));
        assert_eq!(filter.tables, Some(vec!["transaction".to_string()]));
        assert!(filter.conflict_types.is_none());
        assert!(options.dry_run);
    }

    #[test]
    fn test_suggestion_label() {
        let mut conflict = enhanced("transaction:1");
        conflict.suggested_resolution = Some(Resolution::Server);
        conflict.suggestion_confidence = 0.5;
        assert_eq!(suggestion_label(&conflict), "server (50%)");

        conflict.suggested_resolution = None;
        assert_eq!(suggestion_label(&conflict), "-");
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(None), "<absent>");
        assert_eq!(render_value(Some(&json!(12.5))), "12.5");
        assert_eq!(render_value(Some(&json!("x"))), "\"x\"");
    }
}
