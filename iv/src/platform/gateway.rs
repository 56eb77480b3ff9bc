//! HTTP gateway client
//!
//! Talks to a session-holding gateway in front of the messaging platform.
//! Authentication with the platform itself lives in the gateway; this client
//! only carries a bearer token for the gateway.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use eyre::Context;

use super::{AccountRef, ChatRef, MembershipStatus, Platform, PlatformError, Privileges};
use crate::config::GatewayConfig;
use crate::identity::Identity;

/// Wait assumed when a 429 carries no usable `retry-after` header
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct ChatBody {
    id: i64,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberBody {
    status: String,
    #[serde(default)]
    privileges: Option<PrivilegesBody>,
}

#[derive(Debug, Deserialize)]
struct PrivilegesBody {
    #[serde(default)]
    can_invite_users: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Map a non-success gateway response to a [`PlatformError`]
///
/// Platform error names in the body take precedence; a bare 429 falls back
/// to the `retry-after` header. Rejected credentials and an unavailable
/// gateway end the run.
pub(crate) fn map_api_error(status: u16, retry_after: Option<u64>, body: &str) -> PlatformError {
    debug!(status, ?retry_after, "map_api_error: called");
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);

    if let Some(err) = &parsed {
        if let Some(secs) = err.kind.strip_prefix("FLOOD_WAIT_").and_then(|s| s.parse::<u64>().ok()) {
            debug!(secs, "map_api_error: flood wait");
            return PlatformError::RateLimited {
                retry_after: Duration::from_secs(secs),
            };
        }
        match err.kind.as_str() {
            "USERNAME_NOT_OCCUPIED" | "PEER_ID_INVALID" | "USER_ID_INVALID" => {
                return PlatformError::NotFound(err.message.clone());
            }
            "USERNAME_INVALID" => return PlatformError::InvalidIdentity(err.message.clone()),
            "USER_ALREADY_PARTICIPANT" => return PlatformError::AlreadyParticipant,
            "USER_PRIVACY_RESTRICTED" => return PlatformError::PrivacyRestricted,
            _ => {}
        }
    }

    if status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
        debug!("map_api_error: rate limited (429)");
        return PlatformError::RateLimited {
            retry_after: Duration::from_secs(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS)),
        };
    }

    if status == StatusCode::UNAUTHORIZED.as_u16() {
        let message = parsed.map(|e| e.message).unwrap_or_else(|| body.trim().to_string());
        return PlatformError::Unauthorized(message);
    }

    match parsed {
        None if status == StatusCode::FORBIDDEN.as_u16() => PlatformError::Unauthorized(body.trim().to_string()),
        None if matches!(status, 502..=504) => {
            PlatformError::Disconnected(format!("gateway unavailable (HTTP {}): {}", status, body.trim()))
        }
        Some(err) => PlatformError::Api {
            code: status,
            kind: err.kind,
            message: err.message,
        },
        None if status == StatusCode::NOT_FOUND.as_u16() => PlatformError::NotFound(body.trim().to_string()),
        None => PlatformError::Api {
            code: status,
            kind: "UNKNOWN".to_string(),
            message: body.trim().to_string(),
        },
    }
}

/// Map a transport failure; anything that loses the gateway mid-request is fatal
fn map_send_error(e: reqwest::Error) -> PlatformError {
    if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
        debug!(error = %e, "map_send_error: gateway lost");
        PlatformError::Disconnected(e.to_string())
    } else {
        PlatformError::Network(e)
    }
}

/// [`Platform`] implementation backed by the HTTP gateway
pub struct GatewayClient {
    base_url: Url,
    token: String,
    http: Client,
}

impl GatewayClient {
    /// Create a client from configuration, reading the token from the environment
    pub fn from_config(config: &GatewayConfig) -> eyre::Result<Self> {
        debug!(?config, "GatewayClient::from_config: called");
        let token = config.get_token()?;
        let client = Self::new(&config.base_url, token, Duration::from_millis(config.timeout_ms))
            .context(format!("Invalid gateway settings for {}", config.base_url))?;
        Ok(client)
    }

    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, PlatformError> {
        debug!(%base_url, ?timeout, "GatewayClient::new: called");
        let base_url = Url::parse(base_url)
            .map_err(|e| PlatformError::InvalidResponse(format!("Invalid gateway URL '{}': {}", base_url, e)))?;
        let http = Client::builder().timeout(timeout).build().map_err(PlatformError::Network)?;
        Ok(Self {
            base_url,
            token: token.into(),
            http,
        })
    }

    /// Build `{base}/{segments...}` with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::InvalidResponse(format!("Gateway URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(map_api_error(status.as_u16(), retry_after, &body))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, PlatformError> {
        let url = self.url(segments)?;
        debug!(%url, "GatewayClient::get: called");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(map_send_error)?;
        let response = Self::check(response).await?;
        let text = response.text().await.map_err(map_send_error)?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn post(&self, segments: &[&str], body: &serde_json::Value) -> Result<(), PlatformError> {
        let url = self.url(segments)?;
        debug!(%url, "GatewayClient::post: called");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Platform for GatewayClient {
    async fn get_chat(&self, reference: &str) -> Result<ChatRef, PlatformError> {
        let body: ChatBody = self.get(&["chats", reference]).await?;
        Ok(ChatRef {
            id: body.id,
            title: body.title.unwrap_or_else(|| reference.to_string()),
        })
    }

    async fn self_privileges(&self, chat: &ChatRef) -> Result<Privileges, PlatformError> {
        let chat_id = chat.id.to_string();
        let body: MemberBody = self.get(&["chats", &chat_id, "members", "me"]).await?;
        debug!(status = %body.status, "GatewayClient::self_privileges: member status");
        Ok(Privileges {
            can_invite_users: body.privileges.map(|p| p.can_invite_users).unwrap_or(false),
        })
    }

    async fn resolve_identity(&self, identity: &Identity) -> Result<AccountRef, PlatformError> {
        let body: UserBody = self.get(&["users", identity.as_str()]).await?;
        Ok(AccountRef {
            id: body.id,
            handle: body.username.unwrap_or_else(|| identity.as_str().to_string()),
        })
    }

    async fn membership(&self, chat: &ChatRef, account: &AccountRef) -> Result<Option<MembershipStatus>, PlatformError> {
        let chat_id = chat.id.to_string();
        let user_id = account.id.to_string();
        match self.get::<MemberBody>(&["chats", &chat_id, "members", &user_id]).await {
            Ok(body) => Ok(MembershipStatus::from_api(&body.status)),
            Err(PlatformError::NotFound(_)) => Ok(Some(MembershipStatus::NotMember)),
            Err(PlatformError::Api { kind, .. }) if kind == "USER_NOT_PARTICIPANT" => {
                Ok(Some(MembershipStatus::NotMember))
            }
            Err(e) => Err(e),
        }
    }

    async fn add_member(&self, chat: &ChatRef, account: &AccountRef) -> Result<(), PlatformError> {
        let chat_id = chat.id.to_string();
        self.post(
            &["chats", &chat_id, "members"],
            &serde_json::json!({ "user_id": account.id }),
        )
        .await
    }
}
