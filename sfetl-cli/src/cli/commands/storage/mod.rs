mod handler;

pub use handler::handle_storage_command;
