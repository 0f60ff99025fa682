use anyhow::Result;
use colored::*;

use super::CompareArgs;
use crate::cli::app::AppContext;
use crate::services::compare::{ComparisonReport, UploadStatus, compare_counts, export_comparison_to_excel};

pub async fn handle_compare_command(ctx: &AppContext, args: CompareArgs) -> Result<()> {
    let source = ctx.source().await?;
    let client = ctx.connect().await?;

    let report = compare_counts(&client, &source, ctx.org_type.as_str()).await?;
    print_report(&report);

    if let Some(path) = args.xlsx {
        export_comparison_to_excel(&report, &path)?;
        println!("Workbook written to {}", path.display().to_string().cyan());
    }

    Ok(())
}

fn print_report(report: &ComparisonReport) {
    println!("{}", format!("Upload comparison: {}", report.org_type).bold());
    println!("Generated: {}", report.generated_at);
    println!();
    println!(
        "{:<32} {:>10} {:>11} {:>9} {:>7}  {}",
        "Object", "Source", "Salesforce", "Missing", "Rate", "Status"
    );
    println!("{}", "-".repeat(90).dimmed());

    for object in &report.objects {
        let status = match object.status {
            UploadStatus::Complete => object.status.label().green(),
            UploadStatus::Partial => object.status.label().yellow(),
            UploadStatus::Missing => object.status.label().red(),
            UploadStatus::NotApplicable => object.status.label().dimmed(),
        };
        let rate = if object.source > 0 {
            format!("{:.0}%", object.rate())
        } else {
            "-".to_string()
        };
        print!(
            "{:<32} {:>10} {:>11} {:>9} {:>7}  {}",
            object.object,
            object.source,
            object.org,
            object.missing(),
            rate,
            status
        );
        match &object.error {
            Some(error) => println!("  {}", error.dimmed()),
            None => println!(),
        }
    }

    println!("{}", "-".repeat(90).dimmed());
    println!(
        "Complete: {}  Partial: {}  Missing: {}  No source data: {}",
        report.with_status(UploadStatus::Complete).count(),
        report.with_status(UploadStatus::Partial).count(),
        report.with_status(UploadStatus::Missing).count(),
        report.with_status(UploadStatus::NotApplicable).count()
    );
    println!(
        "Records: {} of {} uploaded ({:.2}%)",
        report.total_uploaded(),
        report.total_source(),
        report.overall_rate()
    );
}
