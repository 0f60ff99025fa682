use anyhow::Result;
use colored::*;

use super::CleanupArgs;
use crate::cli::app::AppContext;
use crate::cli::commands::confirm;
use crate::services::cleanup::{CleanupOptions, CleanupReport, cleanup};
use crate::upload::catalog;

pub async fn handle_cleanup_command(ctx: &AppContext, args: CleanupArgs) -> Result<()> {
    let specs = catalog::filter(&args.only, &args.skip)?;
    if specs.is_empty() {
        anyhow::bail!("No objects selected");
    }

    let client = ctx.connect().await?;

    if args.confirm {
        let prompt = format!(
            "Delete records of {} objects from the {} org?",
            specs.len(),
            ctx.org_type
        );
        if !confirm(&prompt, args.yes)? {
            println!("Cancelled");
            return Ok(());
        }
    } else {
        println!("{}", "Count only: pass --confirm to delete".yellow());
    }

    let options = CleanupOptions {
        limit: args.limit,
        confirm: args.confirm,
        clear_mappings: args.clear_mappings,
    };

    let mut id_map = if args.clear_mappings && args.confirm {
        Some(ctx.id_map(false).await?)
    } else {
        None
    };

    let report = cleanup(&client, &specs, &options, id_map.as_mut()).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &CleanupReport) {
    for object in &report.objects {
        if let Some(reason) = &object.skipped {
            println!("  {} {:<28} {}", "-".dimmed(), object.object, reason.dimmed());
            continue;
        }
        if object.found == 0 {
            continue;
        }

        if report.confirmed {
            let failed = if object.failed > 0 {
                format!("{} failed", object.failed).red().to_string()
            } else {
                String::new()
            };
            println!(
                "  {} {:<28} {:>8} deleted {}",
                "✓".green(),
                object.object,
                object.deleted,
                failed
            );
            for error in &object.sample_errors {
                println!("      {}", error.dimmed());
            }
            if object.mappings_cleared > 0 {
                println!("      {} mappings cleared", object.mappings_cleared);
            }
        } else {
            println!("  {:<30} {:>8} records", object.object, object.found);
        }
    }

    println!();
    println!("{}", "Cleanup summary".bold());
    println!("  Records found:   {}", report.total_found());
    if report.confirmed {
        println!("  Records deleted: {}", report.total_deleted());
        println!("  Errors:          {}", report.total_failed());
    }
    let skipped = report.skipped();
    if !skipped.is_empty() {
        println!("  Skipped:         {}", skipped.join(", "));
    }
    if report.confirmed && report.total_failed() * 10 > report.total_deleted() + report.total_failed() {
        println!(
            "  {} Many deletes failed; records referencing them may need deleting first",
            "!".yellow()
        );
    }
}
