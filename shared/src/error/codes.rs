//! Unified error codes for the Stockroom workspace
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 2xxx: Permission errors
//! - 6xxx: Product and image errors
//! - 9xxx: System errors (backend, network, local storage)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility with the desktop front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,
    /// Update would not change anything
    NoChanges = 9,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,

    // ==================== 6xxx: Product ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product name already exists
    ProductNameExists = 6004,

    // ==================== 65xx: Image ====================
    /// Invalid/corrupted image file
    InvalidImageFile = 6503,

    // ==================== 9xxx: System ====================
    /// Internal error
    InternalError = 9001,
    /// Unclassified backend error (passed through verbatim)
    BackendError = 9002,
    /// Network error, retry suggested
    NetworkError = 9003,
    /// Configuration error
    ConfigError = 9005,

    // ==================== 94xx: Local storage ====================
    /// Local asset cache failure
    AssetCacheError = 9405,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Whether the user should be prompted to retry
    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::NetworkError)
    }

    /// Whether this code is an informational outcome rather than a failure
    #[inline]
    pub const fn is_informational(&self) -> bool {
        matches!(self, ErrorCode::NoChanges)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",
            ErrorCode::NoChanges => "Nothing to update",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductNameExists => "Product name already exists",

            // Image
            ErrorCode::InvalidImageFile => "Invalid image file",

            // System
            ErrorCode::InternalError => "Internal error",
            ErrorCode::BackendError => "Backend error",
            ErrorCode::NetworkError => "Network error, confirm you have a working connection",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::AssetCacheError => "Local image cache error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),
            9 => Ok(ErrorCode::NoChanges),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),

            // Product
            6001 => Ok(ErrorCode::ProductNotFound),
            6004 => Ok(ErrorCode::ProductNameExists),

            // Image
            6503 => Ok(ErrorCode::InvalidImageFile),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::BackendError),
            9003 => Ok(ErrorCode::NetworkError),
            9005 => Ok(ErrorCode::ConfigError),
            9405 => Ok(ErrorCode::AssetCacheError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::ValidationFailed.code(), 2);
        assert_eq!(ErrorCode::NoChanges.code(), 9);
        assert_eq!(ErrorCode::PermissionDenied.code(), 2001);
        assert_eq!(ErrorCode::ProductNameExists.code(), 6004);
        assert_eq!(ErrorCode::InvalidImageFile.code(), 6503);
        assert_eq!(ErrorCode::NetworkError.code(), 9003);
    }

    #[test]
    fn test_try_from_round_trips_every_code() {
        let all = [
            ErrorCode::Success,
            ErrorCode::Unknown,
            ErrorCode::ValidationFailed,
            ErrorCode::NotFound,
            ErrorCode::RequiredField,
            ErrorCode::ValueOutOfRange,
            ErrorCode::NoChanges,
            ErrorCode::PermissionDenied,
            ErrorCode::ProductNotFound,
            ErrorCode::ProductNameExists,
            ErrorCode::InvalidImageFile,
            ErrorCode::InternalError,
            ErrorCode::BackendError,
            ErrorCode::NetworkError,
            ErrorCode::ConfigError,
            ErrorCode::AssetCacheError,
        ];
        for code in all {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(6), Err(InvalidErrorCode(6)));
        assert_eq!(ErrorCode::try_from(10000), Err(InvalidErrorCode(10000)));
    }

    #[test]
    fn test_retryable_and_informational() {
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(!ErrorCode::PermissionDenied.is_retryable());
        assert!(!ErrorCode::BackendError.is_retryable());
        assert!(ErrorCode::NoChanges.is_informational());
        assert!(!ErrorCode::ProductNameExists.is_informational());
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::ProductNameExists).unwrap();
        assert_eq!(json, "6004");
        let code: ErrorCode = serde_json::from_str("9003").unwrap();
        assert_eq!(code, ErrorCode::NetworkError);
        assert!(serde_json::from_str::<ErrorCode>("1234").is_err());
    }
}
