use clap::Args;
use std::path::PathBuf;

mod handler;

pub use handler::handle_compare_command;

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Also write an Excel workbook to this path
    #[arg(long)]
    pub xlsx: Option<PathBuf>,
}
