//! Run-level error types

use thiserror::Error;

use crate::platform::PlatformError;

/// Errors that end a run
///
/// Per-identity failures never appear here; they are recorded as outcomes
/// and the run continues.
#[derive(Debug, Error)]
pub enum InviteError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Permission error: the acting account cannot invite users to '{chat}'")]
    Permission { chat: String },

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}
