use anyhow::Result;
use colored::*;

use super::MappingsCommands;
use crate::cli::app::AppContext;
use crate::cli::commands::confirm;

pub async fn handle_mappings_command(ctx: &AppContext, command: MappingsCommands) -> Result<()> {
    let mut id_map = ctx.id_map(false).await?;
    let db = ctx.config.mapping_db_path();

    match command {
        MappingsCommands::Show { object: Some(object) } => {
            println!("{}: {} mappings", object.bold(), id_map.count(&object));
        }
        MappingsCommands::Show { object: None } => {
            let counts = id_map.counts();
            if counts.is_empty() {
                println!("No ID mappings in {}", db.display().to_string().cyan());
                return Ok(());
            }

            println!("ID mappings in {}", db.display().to_string().cyan());
            for (object, count) in &counts {
                println!("  {:<28} {:>9}", object, count);
            }
            println!("{}", "-".repeat(38).dimmed());
            println!("  {:<28} {:>9}", "Total", id_map.total());
        }
        MappingsCommands::Clear { object, yes } => {
            let (target, count) = match &object {
                Some(o) => (format!("the {} mappings", o), id_map.count(o)),
                None => ("all mappings".to_string(), id_map.total()),
            };
            if count == 0 {
                println!("Nothing to clear");
                return Ok(());
            }

            if !confirm(&format!("Delete {} ({} entries)?", target, count), yes)? {
                println!("Cancelled");
                return Ok(());
            }

            let removed = match &object {
                Some(o) => id_map.clear_object(o).await?,
                None => id_map.clear_all().await?,
            };
            println!("{} Removed {} mappings", "✓".green(), removed);
        }
    }

    Ok(())
}
