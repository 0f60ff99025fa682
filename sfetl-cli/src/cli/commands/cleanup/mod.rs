use clap::Args;

mod handler;

pub use handler::handle_cleanup_command;

#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Clean only these objects (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Leave these objects alone
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Records deleted per object
    #[arg(long)]
    pub limit: Option<usize>,

    /// Actually delete; without it only counts are shown
    #[arg(long)]
    pub confirm: bool,

    /// Also remove the ID mappings of cleaned objects
    #[arg(long)]
    pub clear_mappings: bool,

    /// Do not ask before deleting
    #[arg(long)]
    pub yes: bool,
}
