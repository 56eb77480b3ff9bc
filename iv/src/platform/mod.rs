//! Remote platform capability
//!
//! The engine only talks to the messaging platform through [`Platform`], so
//! the invitation state machine can run against the HTTP gateway in
//! production and against a scripted fake in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod error;
mod gateway;

pub use error::PlatformError;
pub use gateway::GatewayClient;

use crate::identity::Identity;

/// A resolved group chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: i64,
    pub title: String,
}

/// A resolved platform account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: i64,
    pub handle: String,
}

/// Privileges of the acting account in the target chat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privileges {
    pub can_invite_users: bool,
}

/// Membership of an account in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
    #[serde(rename = "none")]
    NotMember,
}

impl MembershipStatus {
    /// Whether the account already takes part in the chat (any role)
    pub fn is_participant(&self) -> bool {
        matches!(
            self,
            MembershipStatus::Owner | MembershipStatus::Administrator | MembershipStatus::Member
        )
    }

    /// Parse a platform status name; `creator` is accepted as `owner`
    pub fn from_api(status: &str) -> Option<Self> {
        match status.to_lowercase().as_str() {
            "owner" | "creator" => Some(Self::Owner),
            "administrator" | "admin" => Some(Self::Administrator),
            "member" => Some(Self::Member),
            "restricted" => Some(Self::Restricted),
            "left" => Some(Self::Left),
            "banned" | "kicked" => Some(Self::Banned),
            "none" | "not_member" => Some(Self::NotMember),
            _ => None,
        }
    }
}

/// Operations the invitation engine needs from the platform
///
/// Every call is idempotent except `add_member`, and a repeated
/// `add_member` for an existing participant reports
/// [`PlatformError::AlreadyParticipant`] rather than succeeding twice.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Resolve a chat reference (public link or username)
    async fn get_chat(&self, reference: &str) -> Result<ChatRef, PlatformError>;

    /// Privileges of the acting account in `chat`
    async fn self_privileges(&self, chat: &ChatRef) -> Result<Privileges, PlatformError>;

    /// Resolve a handle to an account
    async fn resolve_identity(&self, identity: &Identity) -> Result<AccountRef, PlatformError>;

    /// Membership of `account` in `chat`; `Ok(None)` when the platform can't tell
    async fn membership(&self, chat: &ChatRef, account: &AccountRef) -> Result<Option<MembershipStatus>, PlatformError>;

    /// Add `account` to `chat`
    async fn add_member(&self, chat: &ChatRef, account: &AccountRef) -> Result<(), PlatformError>;
}
