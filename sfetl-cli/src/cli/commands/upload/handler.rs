use anyhow::Result;
use colored::*;

use super::UploadArgs;
use crate::api::{OfflineOrg, OrgApi};
use crate::cli::app::AppContext;
use crate::upload::catalog;
use crate::upload::uploader::plan;
use crate::upload::{UploadOptions, UploadReport, Uploader};

pub async fn handle_upload_command(ctx: &AppContext, args: UploadArgs) -> Result<()> {
    let specs = catalog::filter(&args.only, &args.skip)?;
    if specs.is_empty() {
        anyhow::bail!("No objects selected");
    }

    if args.plan {
        println!("{}", "Upload order".bold());
        for (i, spec) in plan(&specs)?.iter().enumerate() {
            println!("  {:>2}. {}", i + 1, spec.name);
        }
        return Ok(());
    }

    let batch_size = args.batch_size.unwrap_or(ctx.config.batch_size);
    if batch_size == 0 {
        anyhow::bail!("--batch-size must be greater than 0");
    }

    let options = UploadOptions {
        batch_size,
        limit: args.limit,
        skip_uploaded: args.skip_uploaded,
        convert_leads: !args.no_convert_leads && !args.dry_run,
    };

    let source = ctx.source().await?;
    let mut id_map = ctx.id_map(args.dry_run).await?;

    let live;
    let offline;
    let api: &dyn OrgApi = if args.dry_run {
        println!("{}", "Dry run: nothing will be written to the org".yellow());
        offline = OfflineOrg::new();
        &offline
    } else {
        live = ctx.connect().await?;
        &live
    };

    println!(
        "Uploading {} objects to the {} org ({} existing mappings)...",
        specs.len(),
        ctx.org_type.to_string().cyan(),
        id_map.total()
    );

    let mut report = UploadReport::new(ctx.org_type.as_str(), args.dry_run);
    let mut uploader = Uploader::new(api, &source, &mut id_map, options);
    let outcome = uploader.run(&specs, &mut report).await;

    // Write what we have even when the run stopped early
    report.print_summary();

    let dir = ctx.output_dir()?;
    let report_path = args
        .report
        .unwrap_or_else(|| dir.join(format!("{}_upload_report.json", ctx.org_type)));
    report.write_json(&report_path)?;
    println!("Report written to {}", report_path.display().to_string().cyan());

    let failures_path = report_path.with_extension("failures.csv");
    let failures = report.write_failures_csv(&failures_path)?;
    if failures > 0 {
        println!(
            "{} row problems written to {}",
            failures,
            failures_path.display().to_string().cyan()
        );
    }

    outcome
}
