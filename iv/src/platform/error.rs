//! Platform error types

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the remote platform capability
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("User is already a participant")]
    AlreadyParticipant,

    #[error("User privacy settings forbid the invitation")]
    PrivacyRestricted,

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {code} {kind}: {message}")]
    Api { code: u16, kind: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Disconnected from platform: {0}")]
    Disconnected(String),

    #[error("Gateway rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlatformError {
    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, PlatformError::RateLimited { .. })
    }

    /// Get the mandatory wait if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Check if this error ends the whole run rather than one identity
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlatformError::Disconnected(_) | PlatformError::Unauthorized(_))
    }
}
