//! Identity handles

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized account handle on the remote platform
///
/// Handles are compared after trimming, stripping leading `@` and
/// lowercasing, so `@Alice` and `alice` are the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Normalize a raw handle, returning `None` if nothing is left
    pub fn parse(raw: &str) -> Option<Self> {
        let handle = raw.trim().trim_start_matches('@').trim().to_lowercase();
        if handle.is_empty() { None } else { Some(Self(handle)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}
