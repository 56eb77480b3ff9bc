//! Inviter - resumable, rate-aware bulk invitations
//!
//! Walks a roster of account handles and invites each one into a group chat
//! on a messaging platform. The platform throttles aggressively, so
//! invitations are strictly sequential, paced by an adaptive delay, and
//! progress is checkpointed after every batch so an interrupted run resumes
//! without redoing finished batches.
//!
//! # Modules
//!
//! - [`engine`] - batch iteration, checkpointing and completion
//! - [`chunk`] - per-batch processing and the per-identity state machine
//! - [`outcome`] - classification of remote results
//! - [`rate`] - adaptive inter-invitation delay
//! - [`platform`] - remote capability trait and HTTP gateway client
//! - [`source`] - roster loading
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod chunk;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod outcome;
pub mod platform;
pub mod rate;
pub mod source;
pub mod state;

pub use chunk::{BatchReport, ChunkProcessor};
pub use config::{Config, GatewayConfig, RunConfig, ThrottlePolicy};
pub use engine::{InvitationEngine, RunSummary};
pub use error::InviteError;
pub use identity::Identity;
pub use outcome::{Outcome, OutcomeClass, Recovery, Verdict};
pub use platform::{AccountRef, ChatRef, GatewayClient, MembershipStatus, Platform, PlatformError, Privileges};
pub use rate::RateController;
pub use state::RunState;
