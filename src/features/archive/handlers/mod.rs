pub mod archive_handler;

pub use archive_handler::*;
