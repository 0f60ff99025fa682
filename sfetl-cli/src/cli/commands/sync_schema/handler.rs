use anyhow::Result;
use colored::*;

use super::SyncSchemaArgs;
use crate::cli::app::AppContext;
use crate::schema::diff::SchemaDiffStats;
use crate::schema::load_schema;
use crate::schema::sync::{ActionKind, Outcome, SchemaSyncer, SyncAction, SyncReport};

pub async fn handle_sync_schema_command(ctx: &AppContext, args: SyncSchemaArgs) -> Result<()> {
    let path = match args.schema {
        Some(path) => path,
        None => ctx.config.output_dir().join("original_schema.json"),
    };

    let mut schema = load_schema(&path)?;
    if !args.objects.is_empty() {
        schema.retain(|o| args.objects.contains(&o.object));
    }
    if schema.is_empty() {
        anyhow::bail!("No objects to sync in {}", path.display());
    }

    let client = ctx.connect().await?;
    let mut syncer = SchemaSyncer::new(&client, args.dry_run).await?;

    println!(
        "Comparing {} objects from {} with the {} org...",
        schema.len(),
        path.display().to_string().cyan(),
        ctx.org_type.to_string().cyan()
    );
    let stats = SchemaDiffStats::from_diffs(&syncer.plan(&schema).await?);
    println!(
        "  {} objects to create, {} fields to add, {} external-id fields, {} fields already match",
        stats.objects_to_create, stats.fields_to_add, stats.external_ids_to_add, stats.fields_matching
    );
    println!();

    let report = syncer.sync(&schema).await?;
    print_actions(&report);
    print_summary(&report, args.dry_run);

    if report.failed() > 0 {
        anyhow::bail!("{} schema changes failed", report.failed());
    }
    Ok(())
}

fn print_actions(report: &SyncReport) {
    for action in &report.actions {
        if action.outcome == Outcome::AlreadyExists {
            continue;
        }
        println!("{}", format_action(action));
    }
}

fn format_action(action: &SyncAction) -> String {
    let what = match action.kind {
        ActionKind::CreateObject => "object",
        ActionKind::CreateField => "field",
        ActionKind::CreateExternalId => "external id",
    };
    let line = format!("{} {} [{}]", what, action.target, action.detail);

    match &action.outcome {
        Outcome::Planned => format!("  {} {}", "+".cyan(), line),
        Outcome::Created => format!("  {} {}", "✓".green(), line),
        Outcome::AlreadyExists => format!("  {} {}", "=".dimmed(), line.dimmed()),
        Outcome::Skipped(reason) => format!("  {} {} ({})", "-".yellow(), line, reason.dimmed()),
        Outcome::Failed(reason) => format!("  {} {}: {}", "✗".red(), line, reason.red()),
    }
}

fn print_summary(report: &SyncReport, dry_run: bool) {
    let verb = if dry_run { "planned" } else { "created" };

    println!();
    println!("{}", "Schema sync summary".bold());
    for (label, kind) in [
        ("Custom objects", ActionKind::CreateObject),
        ("Custom fields", ActionKind::CreateField),
        ("External-id fields", ActionKind::CreateExternalId),
    ] {
        println!(
            "  {:<20} {} {}, {} existing, {} skipped",
            label,
            report.created(kind),
            verb,
            report.existing(kind),
            report.skipped(kind)
        );
    }

    if report.standard_missing > 0 {
        println!(
            "  {} standard fields are missing from the org and were not created",
            report.standard_missing
        );
    }
    if !report.type_mismatches.is_empty() {
        println!("  {} fields differ in type and need manual review:", report.type_mismatches.len());
        for field in &report.type_mismatches {
            println!("    {}", field.yellow());
        }
    }

    let failed = report.failed();
    if failed > 0 {
        println!("  {}", format!("{} failed", failed).red());
    } else {
        println!("  {}", "No failures".green());
    }
}
