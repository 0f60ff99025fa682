use clap::Args;
use std::path::PathBuf;

mod handler;

pub use handler::handle_upload_command;

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Upload only these objects (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Leave these objects out
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Rows read per object
    #[arg(long)]
    pub limit: Option<usize>,

    /// Rows per batch (default: `batch_size` from the config)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Map and report without writing to the org
    #[arg(long)]
    pub dry_run: bool,

    /// Skip rows that already have an ID mapping
    #[arg(long)]
    pub skip_uploaded: bool,

    /// Do not convert Leads after upload
    #[arg(long)]
    pub no_convert_leads: bool,

    /// Only print the upload order
    #[arg(long)]
    pub plan: bool,

    /// JSON report path (default: `<output dir>/<org>_upload_report.json`)
    #[arg(long)]
    pub report: Option<PathBuf>,
}
