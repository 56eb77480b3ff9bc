//! Per-identity outcomes and their classification
//!
//! Every remote result for an identity is reduced to a [`Verdict`], which
//! fixes both what is recorded for the identity and what the processor does
//! next ([`Recovery`]).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::platform::PlatformError;

/// Coarse reporting bucket of an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeClass {
    Success,
    Skip,
    Failure,
}

/// Terminal result for one identity within an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Invited,
    AlreadyMember,
    PrivacyRestricted,
    InvalidIdentity,
    UnknownError(String),
}

impl Outcome {
    pub fn class(&self) -> OutcomeClass {
        match self {
            Outcome::Invited => OutcomeClass::Success,
            Outcome::AlreadyMember | Outcome::PrivacyRestricted => OutcomeClass::Skip,
            Outcome::InvalidIdentity | Outcome::UnknownError(_) => OutcomeClass::Failure,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Invited => write!(f, "invited"),
            Outcome::AlreadyMember => write!(f, "already a member"),
            Outcome::PrivacyRestricted => write!(f, "privacy restricted"),
            Outcome::InvalidIdentity => write!(f, "invalid identity"),
            Outcome::UnknownError(message) => write!(f, "unexpected error: {}", message),
        }
    }
}

/// Classified result of dispatching one identity
#[derive(Debug)]
pub enum Verdict {
    /// The identity reached a terminal outcome
    Settled(Outcome),
    /// The platform demands a wait before any further call
    Throttled { wait: Duration },
    /// The run cannot continue
    Fatal(PlatformError),
}

/// What the processor does after a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Sleep for the controller's current delay
    Pace,
    /// Sleep for exactly the demanded wait, then raise the controller's delay
    WaitAndEscalate(Duration),
    /// Move on to the next identity immediately
    Continue,
    /// Stop the run
    Abort,
}

impl Verdict {
    pub fn recovery(&self) -> Recovery {
        match self {
            Verdict::Settled(Outcome::Invited) => Recovery::Pace,
            Verdict::Settled(_) => Recovery::Continue,
            Verdict::Throttled { wait } => Recovery::WaitAndEscalate(*wait),
            Verdict::Fatal(_) => Recovery::Abort,
        }
    }
}

/// Errors shared by every step: throttling, fatal loss of the platform, and the rest
fn classify_common(err: PlatformError) -> Verdict {
    if let Some(wait) = err.retry_after() {
        return Verdict::Throttled { wait };
    }
    if err.is_fatal() {
        return Verdict::Fatal(err);
    }
    match err {
        PlatformError::NotFound(_) | PlatformError::InvalidIdentity(_) => Verdict::Settled(Outcome::InvalidIdentity),
        other => Verdict::Settled(Outcome::UnknownError(other.to_string())),
    }
}

/// Classify a failed identity resolution
pub fn classify_resolution(err: PlatformError) -> Verdict {
    classify_common(err)
}

/// Classify the result of an add-member call
pub fn classify_addition(result: Result<(), PlatformError>) -> Verdict {
    match result {
        Ok(()) => Verdict::Settled(Outcome::Invited),
        Err(PlatformError::AlreadyParticipant) => Verdict::Settled(Outcome::AlreadyMember),
        Err(PlatformError::PrivacyRestricted) => Verdict::Settled(Outcome::PrivacyRestricted),
        Err(err) => classify_common(err),
    }
}
