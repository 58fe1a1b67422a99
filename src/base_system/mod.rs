pub mod book_paths;
pub mod config;
pub mod context;
pub mod logging;
