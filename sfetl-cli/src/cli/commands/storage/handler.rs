use anyhow::Result;
use colored::*;

use crate::cli::app::AppContext;
use crate::services::storage::storage_report;
use crate::upload::CATALOG;

pub async fn handle_storage_command(ctx: &AppContext) -> Result<()> {
    let client = ctx.connect().await?;
    let objects: Vec<&str> = CATALOG.iter().map(|s| s.name).collect();

    println!("Checking record counts and storage...");
    let report = storage_report(&client, &objects).await?;

    println!();
    println!("{}", "Record counts by object".bold());
    println!("{}", "-".repeat(40).dimmed());
    for (object, count) in &report.counts {
        println!("  {:<28} {:>9}", object, count);
    }
    println!("{}", "-".repeat(40).dimmed());
    println!("  {:<28} {:>9}", "Total".bold(), report.total_records());

    if !report.inaccessible.is_empty() {
        println!("  {} {}", "Not accessible:".dimmed(), report.inaccessible.join(", ").dimmed());
    }

    println!();
    for (label, limit) in [("Data storage", report.data_storage_mb), ("File storage", report.file_storage_mb)] {
        let Some(limit) = limit else {
            println!("  {:<14} {}", label, "not reported".dimmed());
            continue;
        };
        let percent = if limit.max > 0 {
            limit.used() as f64 / limit.max as f64 * 100.0
        } else {
            0.0
        };
        let usage = format!("{} / {} MB ({:.1}%)", limit.used(), limit.max, percent);
        let usage = if percent >= 90.0 {
            usage.red()
        } else if percent >= 75.0 {
            usage.yellow()
        } else {
            usage.green()
        };
        println!("  {:<14} {}", label, usage);
    }

    if report.data_storage_mb.is_some_and(|l| l.max > 0 && l.used() * 10 >= l.max * 9) {
        println!();
        println!(
            "{} Data storage is nearly full; free space with {}",
            "!".yellow(),
            "sfetl cleanup --confirm".cyan()
        );
    }

    Ok(())
}
