//! Shared types for Stockroom
//!
//! Data model, error types and small utilities used by the synchronizer,
//! the mutation operations and the desktop front end.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
pub use serde::{Deserialize, Serialize};
