use anyhow::Result;
use colored::*;

use super::ExportSchemaArgs;
use crate::cli::app::AppContext;
use crate::schema::export::{export_schema, write_schema};
use crate::upload::CATALOG;

pub async fn handle_export_schema_command(ctx: &AppContext, args: ExportSchemaArgs) -> Result<()> {
    let objects: Vec<String> = if args.objects.is_empty() {
        CATALOG.iter().map(|s| s.name.to_string()).collect()
    } else {
        args.objects
    };
    let dir = match args.output_dir {
        Some(dir) => dir,
        None => ctx.output_dir()?,
    };

    let client = ctx.connect().await?;

    println!("Exporting {} objects from the {} org...", objects.len(), ctx.org_type.to_string().cyan());
    let (schema, missing) = export_schema(&client, &objects).await?;
    if schema.is_empty() {
        anyhow::bail!("None of the requested objects exist in the org");
    }

    let (schema_path, summary_path) = write_schema(&dir, ctx.org_type.as_str(), &schema)?;
    let field_count: usize = schema.iter().map(|o| o.fields.len()).sum();

    println!();
    println!(
        "{} Exported {} objects, {} fields",
        "✓".green(),
        schema.len().to_string().bold(),
        field_count.to_string().bold()
    );
    println!("  Schema:  {}", schema_path.display().to_string().cyan());
    println!("  Summary: {}", summary_path.display().to_string().cyan());
    if !missing.is_empty() {
        println!("  {} {}", "Not in org:".yellow(), missing.join(", "));
    }

    Ok(())
}
