//! Inviter - CLI entry point

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use inviter::cli::{Cli, Command, OutputFormat};
use inviter::config::Config;
use inviter::platform::GatewayClient;
use inviter::source::{fetch_roster, pending};
use inviter::{InvitationEngine, RunSummary};
use progressstore::CheckpointStore;

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str.map(|s| s.to_uppercase()) {
        None => tracing::Level::INFO,
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_file: Option<&PathBuf>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = fs::File::create(path).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(
        cli.log_level.as_deref(),
        config_log_level.as_deref(),
        cli.log_file.as_ref(),
    )
    .context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            chat,
            source,
            checkpoint,
        } => {
            if let Some(chat) = chat {
                config.target.chat = chat;
            }
            if let Some(source) = source {
                config.source.url = source;
            }
            if let Some(checkpoint) = checkpoint {
                config.storage.checkpoint_path = checkpoint;
            }
            cmd_run(&config).await
        }
        Command::Status { checkpoint, format } => {
            if let Some(checkpoint) = checkpoint {
                config.storage.checkpoint_path = checkpoint;
            }
            cmd_status(&config, format).await
        }
        Command::Reset { checkpoint } => {
            if let Some(checkpoint) = checkpoint {
                config.storage.checkpoint_path = checkpoint;
            }
            cmd_reset(&config).await
        }
    }
}

fn checkpoint_store(config: &Config) -> CheckpointStore {
    CheckpointStore::new(&config.storage.checkpoint_path, config.pacing.initial_delay_secs)
}

async fn cmd_run(config: &Config) -> Result<()> {
    debug!("cmd_run: called");
    config.validate()?;

    let store = checkpoint_store(config);
    let checkpoint = store.load().await;
    if checkpoint.is_fresh() {
        info!("Starting a new job");
    } else {
        info!(
            "Resuming after batch {} with {} identities already processed",
            checkpoint.last_completed_batch,
            checkpoint.processed.len()
        );
    }

    let roster = fetch_roster(&config.source.url)
        .await
        .context("Failed to load identity roster")?;
    let pending = pending(&roster, &checkpoint.processed);

    if pending.is_empty() {
        println!("{} Roster is empty or every identity was already processed", "✓".green());
        if store.delete().await? {
            println!("Deleted checkpoint {}", store.path().display());
        }
        return Ok(());
    }

    let platform = Arc::new(GatewayClient::from_config(&config.gateway).context("Failed to create gateway client")?);
    let engine = InvitationEngine::new(platform, config.pacing.clone(), store);

    let summary = tokio::select! {
        result = engine.run(&config.target.chat, &pending, checkpoint) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            warn!("Interrupted; progress up to the last completed batch is kept");
            return Err(eyre!(
                "Interrupted. Run again to resume from {}",
                config.storage.checkpoint_path.display()
            ));
        }
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.requeued > 0 {
        println!("{}", "Run finished with requeued identities".yellow().bold());
    } else {
        println!("{}", "All identities processed".green().bold());
    }
    println!(
        "  Batches:   {}/{}",
        summary.batches_completed.to_string().cyan(),
        summary.total_batches
    );
    println!("  Invited:   {}", summary.successes.to_string().green());
    println!("  Skipped:   {}", summary.skips.to_string().yellow());
    println!("  Failed:    {}", summary.failures.to_string().red());
    if summary.throttles > 0 {
        println!("  Throttled: {}", summary.throttles.to_string().yellow());
    }
    if summary.resumed_past > 0 {
        println!("  Passed over by resume offset: {}", summary.resumed_past);
    }
    println!("  Final delay: {}s", summary.final_delay_secs);
    if summary.skipped_total > 0 {
        println!("  Total identities skipped so far: {}", summary.skipped_total);
    }
    if summary.requeued > 0 {
        println!(
            "{} {} throttled identities are requeued; run again to retry them",
            "!".yellow(),
            summary.requeued
        );
    }
    if summary.checkpoint_deleted {
        println!("{} Checkpoint deleted as the job is complete", "✓".green());
    }
}

async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let store = checkpoint_store(config);

    let Some(checkpoint) = store.try_load().await? else {
        println!("No checkpoint at {}", store.path().display());
        return Ok(());
    };

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": store.path(),
                "processed": checkpoint.processed.len(),
                "skipped": checkpoint.skipped.len(),
                "requeued": checkpoint.requeued.len(),
                "current_delay": checkpoint.current_delay_secs,
                "last_chunk": checkpoint.last_completed_batch,
                "timestamp": checkpoint.saved_at,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Checkpoint: {}", store.path().display().to_string().cyan());
            println!("  Processed: {}", checkpoint.processed.len());
            println!("  Skipped: {}", checkpoint.skipped.len());
            println!("  Requeued: {}", checkpoint.requeued.len());
            println!("  Current delay: {}s", checkpoint.current_delay_secs);
            println!("  Completed batches: {}", checkpoint.last_completed_batch);
            if let Some(saved) = checkpoint.saved_at_display() {
                println!("  Saved at: {}", saved.dimmed());
            }
        }
    }
    Ok(())
}

async fn cmd_reset(config: &Config) -> Result<()> {
    debug!("cmd_reset: called");
    let store = checkpoint_store(config);
    if store.delete().await? {
        println!("{} Deleted checkpoint {}", "✓".green(), store.path().display());
    } else {
        println!("No checkpoint at {}", store.path().display());
    }
    Ok(())
}
