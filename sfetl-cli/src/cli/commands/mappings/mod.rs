use clap::Subcommand;

mod handler;

pub use handler::handle_mappings_command;

#[derive(Debug, Subcommand)]
pub enum MappingsCommands {
    /// Show mapping counts per object
    Show {
        /// Only this object
        #[arg(long)]
        object: Option<String>,
    },
    /// Delete mappings so the next upload starts over
    Clear {
        /// Only this object
        #[arg(long)]
        object: Option<String>,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}
