//! Error types

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
///
/// This is the error every mutation and subscription surfaces to the UI:
/// - Standardized error codes via [`ErrorCode`]
/// - Human-readable messages
/// - Optional structured details (field names, backend codes)
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (field-level errors, context, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Look up a detail entry
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }

    /// Whether the user should be offered a retry
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Whether this is an informational outcome (e.g. nothing to update)
    pub fn is_informational(&self) -> bool {
        self.code.is_informational()
    }

    // ==================== Convenience constructors ====================

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", r))
            .with_detail("resource", r)
    }

    /// Create a permission denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PermissionDenied, msg)
    }

    /// Create a network error (retry suggested)
    pub fn network(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NetworkError, msg)
    }

    /// Create an opaque backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::BackendError, msg)
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    /// Create a "nothing changed" informational error
    pub fn no_changes(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::NoChanges, msg)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<&str> = field_errors.keys().map(|k| &**k).collect();
        fields.sort_unstable();

        // First failing field (alphabetical) drives the message shown to the user
        let message = fields
            .first()
            .and_then(|f| field_errors.get(*f))
            .and_then(|errs| errs.first())
            .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Please provide required data!".to_string());

        let code = fields
            .first()
            .and_then(|f| field_errors.get(*f))
            .and_then(|errs| errs.first())
            .map(|e| match &*e.code {
                "required" => ErrorCode::RequiredField,
                "range" => ErrorCode::ValueOutOfRange,
                "image" => ErrorCode::InvalidImageFile,
                _ => ErrorCode::ValidationFailed,
            })
            .unwrap_or(ErrorCode::ValidationFailed);

        Self::with_message(code, message).with_detail(
            "fields",
            Value::from(fields.iter().map(|f| f.to_string()).collect::<Vec<_>>()),
        )
    }
}

/// Result type alias using [`AppError`]
pub type AppResult<T> = Result<T, AppError>;
