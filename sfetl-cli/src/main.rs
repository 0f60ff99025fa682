mod api;
mod cli;
mod config;
mod logging;
mod schema;
mod services;
mod source;
mod upload;

use anyhow::Result;
use clap::Parser;
use colored::*;
use is_terminal::IsTerminal;

use cli::app::AppContext;
use cli::commands;
use cli::{Cli, Commands};
use config::Config;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Credentials live in .env next to the data
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    let cli = Cli::parse();

    if cli.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    logging::init(cli.log_file.as_deref())?;

    let config = Config::load(cli.config.as_deref())?;
    let ctx = AppContext::new(config, cli.org_type);

    match cli.command {
        Commands::Check => commands::check::handle_check_command(&ctx).await,
        Commands::ExportSchema(args) => commands::export_schema::handle_export_schema_command(&ctx, args).await,
        Commands::SyncSchema(args) => commands::sync_schema::handle_sync_schema_command(&ctx, args).await,
        Commands::Upload(args) => commands::upload::handle_upload_command(&ctx, args).await,
        Commands::Mappings(command) => commands::mappings::handle_mappings_command(&ctx, command).await,
        Commands::Cleanup(args) => commands::cleanup::handle_cleanup_command(&ctx, args).await,
        Commands::Storage => commands::storage::handle_storage_command(&ctx).await,
        Commands::Compare(args) => commands::compare::handle_compare_command(&ctx, args).await,
    }
}
