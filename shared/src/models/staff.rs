//! Staff Model

use serde::{Deserialize, Serialize};

/// Signed-in staff member on whose behalf mutations are performed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffUser {
    /// Login name (email address)
    pub username: String,
}

impl StaffUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}
