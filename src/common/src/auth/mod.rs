//! Admin authentication.
//!
//! Admin endpoints are guarded by static API keys from the configuration.
//! Each key carries a [`Role`]; only [`Role::Admin`] may run maintenance.

mod authenticator;
mod middleware;

pub use authenticator::Authenticator;
pub use middleware::{AdminContextExtractor, admin_auth_middleware};

use crate::config::Role;

/// Identity attached to an authenticated admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminContext {
    /// Name of the API key used, for logging/audit
    pub key_name: String,
    pub role: Role,
}

impl AdminContext {
    pub fn new(key_name: impl Into<String>, role: Role) -> Self {
        Self {
            key_name: key_name.into(),
            role,
        }
    }

    /// Context used when authentication is disabled.
    pub fn anonymous() -> Self {
        Self::new("anonymous", Role::Admin)
    }
}

/// Authentication error with HTTP status code
#[derive(Debug, Clone, thiserror::Error)]
#[error("{status_code}: {message}")]
pub struct AuthError {
    /// HTTP status code (401, 403)
    pub status_code: u16,
    /// Error message for client
    pub message: String,
}

impl AuthError {
    /// Create a 401 Unauthorized error (missing/invalid API key)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status_code: 401,
            message: message.into(),
        }
    }

    /// Create a 403 Forbidden error (valid key without admin role)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status_code: 403,
            message: message.into(),
        }
    }
}
