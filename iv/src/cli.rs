//! CLI argument parsing for the inviter

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inviter - resumable bulk invitations into a group chat
#[derive(Parser, Debug)]
#[command(name = "iv")]
#[command(author, version, about = "Resumable, rate-aware bulk group inviter", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Invite every pending identity, resuming from the checkpoint
    Run {
        /// Target chat (public link or username); overrides the config
        #[arg(long)]
        chat: Option<String>,

        /// Roster URL or path; overrides the config
        #[arg(short, long)]
        source: Option<String>,

        /// Checkpoint file; overrides the config
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Show the persisted checkpoint
    Status {
        /// Checkpoint file; overrides the config
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete the persisted checkpoint
    Reset {
        /// Checkpoint file; overrides the config
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
}

/// Output format for the status command
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}
