mod handler;

pub use handler::handle_check_command;
