use clap::Args;
use std::path::PathBuf;

mod handler;

pub use handler::handle_sync_schema_command;

#[derive(Debug, Args)]
pub struct SyncSchemaArgs {
    /// Schema file (default: `<output dir>/original_schema.json`)
    pub schema: Option<PathBuf>,

    /// Print the planned creations without changing the org
    #[arg(long)]
    pub dry_run: bool,

    /// Only sync these objects
    #[arg(long, value_delimiter = ',')]
    pub objects: Vec<String>,
}
