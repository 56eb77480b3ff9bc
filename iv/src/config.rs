//! Inviter configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::InviteError;

/// Per-job config file looked up in the working directory
const LOCAL_CONFIG_FILE: &str = ".inviter.yml";

/// Main inviter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Platform gateway connection
    pub gateway: GatewayConfig,

    /// Chat that receives the invitations
    pub target: TargetConfig,

    /// Where the identity roster comes from
    pub source: SourceConfig,

    /// Pacing and batching of the run
    pub pacing: RunConfig,

    /// Checkpoint storage
    pub storage: StorageConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before a run
    ///
    /// The gateway token is checked when the client is built.
    pub fn validate(&self) -> Result<()> {
        if self.target.chat.trim().is_empty() {
            return Err(InviteError::Configuration("target chat is not set".to_string()).into());
        }
        if self.source.url.trim().is_empty() {
            return Err(InviteError::Configuration("identity source is not set".to_string()).into());
        }
        self.pacing.validate()?;
        Ok(())
    }

    /// Load configuration
    ///
    /// An explicit `--config` path must load. Otherwise the first readable
    /// file among [`Config::search_paths`] wins, and built-in defaults apply
    /// when none is present. A broken implicit file is logged and passed over.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Ignoring inviter config {}: {:#}", candidate.display(), e),
            }
        }

        tracing::info!("No inviter config found, using built-in pacing and storage defaults");
        Ok(Self::default())
    }

    /// Implicit config locations, most specific first: the job directory,
    /// then the per-user inviter directory
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("inviter").join("inviter.yml"));
        }
        paths
    }

    /// Read just the log level, before logging is initialized
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read inviter config")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse inviter config as YAML")?;

        tracing::info!("Loaded inviter config from {}", path.as_ref().display());
        Ok(config)
    }
}

/// Platform gateway connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the gateway token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            token_env: "INVITER_GATEWAY_TOKEN".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    /// Read the gateway token from the configured environment variable
    pub fn get_token(&self) -> Result<String> {
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(eyre::eyre!(
                "Gateway token not found. Set the {} environment variable.",
                self.token_env
            )),
        }
    }
}

/// Chat that receives the invitations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Public link (`https://t.me/my_chat`) or username of the chat
    pub chat: String,
}

/// Identity roster location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// HTTP(S) URL or local path of a CSV roster
    pub url: String,
}

/// What to do with an identity whose invitation was throttled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThrottlePolicy {
    /// Record it as processed; it is not attempted again by later runs
    #[default]
    MarkProcessed,
    /// Leave it unprocessed so the next run attempts it again
    Requeue,
}

/// Pacing and batching, immutable for the duration of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Delay after each successful invitation, before any throttling
    #[serde(rename = "initial-delay-secs")]
    pub initial_delay_secs: u64,

    /// Growth of the delay per throttle signal
    #[serde(rename = "delay-increment-secs")]
    pub delay_increment_secs: u64,

    /// Upper bound of the delay
    #[serde(rename = "max-delay-secs")]
    pub max_delay_secs: u64,

    /// Identities per batch
    #[serde(rename = "chunk-size")]
    pub chunk_size: usize,

    /// Pause between batches
    #[serde(rename = "chunk-pause-secs")]
    pub chunk_pause_secs: u64,

    /// Handling of throttled identities
    #[serde(rename = "on-throttle")]
    pub on_throttle: ThrottlePolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 15,
            delay_increment_secs: 5,
            max_delay_secs: 60,
            chunk_size: 50,
            chunk_pause_secs: 300,
            on_throttle: ThrottlePolicy::MarkProcessed,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), InviteError> {
        if self.chunk_size == 0 {
            return Err(InviteError::Configuration("chunk-size must be at least 1".to_string()));
        }
        if self.initial_delay_secs > self.max_delay_secs {
            return Err(InviteError::Configuration(format!(
                "initial-delay-secs ({}) exceeds max-delay-secs ({})",
                self.initial_delay_secs, self.max_delay_secs
            )));
        }
        Ok(())
    }

    /// Pause between batches as a Duration
    pub fn chunk_pause(&self) -> Duration {
        Duration::from_secs(self.chunk_pause_secs)
    }
}

/// Checkpoint storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Checkpoint file path
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from(progressstore::DEFAULT_CHECKPOINT_FILE),
        }
    }
}
