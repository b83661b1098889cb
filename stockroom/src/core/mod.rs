//! Core - configuration, on-disk layout and the application context
//!
//! - [`Config`] - environment-driven configuration
//! - [`DataPaths`] - working directory layout
//! - [`AppContext`] - owner of every service

pub mod config;
pub mod context;
pub mod paths;

pub use config::Config;
pub use context::{AppContext, Backend, InMemoryBackend};
pub use paths::DataPaths;
