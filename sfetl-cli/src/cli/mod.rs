//! Command-line interface

pub mod app;
pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::OrgType;
use commands::{
    cleanup::CleanupArgs, compare::CompareArgs, export_schema::ExportSchemaArgs,
    mappings::MappingsCommands, sync_schema::SyncSchemaArgs, upload::UploadArgs,
};

#[derive(Debug, Parser)]
#[command(name = "sfetl", version, about = "Move CRM test data into Salesforce orgs")]
pub struct Cli {
    /// Dataset and target org to work with
    #[arg(long, value_enum, default_value_t = OrgType::Original, global = true)]
    pub org_type: OrgType,

    /// Config file (default: ~/.config/sfetl/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write log output to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify the connection to the org
    Check,
    /// Export object definitions of the org to a schema file
    ExportSchema(ExportSchemaArgs),
    /// Create missing custom objects and fields from a schema file
    SyncSchema(SyncSchemaArgs),
    /// Upload the snapshot in dependency order
    Upload(UploadArgs),
    /// Inspect or reset the local ID mappings
    #[command(subcommand)]
    Mappings(MappingsCommands),
    /// Delete records from the org, children first
    Cleanup(CleanupArgs),
    /// Show record counts and storage usage of the org
    Storage,
    /// Compare snapshot row counts with org record counts
    Compare(CompareArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sfetl",
            "upload",
            "--only",
            "Account,Contact",
            "--org-type",
            "b2b",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.org_type, OrgType::B2b);
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.only, vec!["Account", "Contact"]);
                assert!(args.dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_mappings_subcommands() {
        let cli = Cli::try_parse_from(["sfetl", "mappings", "clear", "--object", "Account", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Mappings(MappingsCommands::Clear { object: Some(ref o), yes: true }) if o == "Account"
        ));
    }

    #[test]
    fn test_rejects_unknown_org_type() {
        assert!(Cli::try_parse_from(["sfetl", "--org-type", "prod", "check"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
