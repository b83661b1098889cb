//! Common infrastructure shared by every service

pub mod logger;

pub use logger::{cleanup_old_logs, init_from_config, init_logger, init_logger_with_file};
