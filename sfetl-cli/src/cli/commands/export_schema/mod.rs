use clap::Args;
use std::path::PathBuf;

mod handler;

pub use handler::handle_export_schema_command;

#[derive(Debug, Args)]
pub struct ExportSchemaArgs {
    /// Objects to export (default: every catalog object)
    #[arg(long, value_delimiter = ',')]
    pub objects: Vec<String>,

    /// Directory for `<org>_schema.json` (default: the configured output directory)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}
