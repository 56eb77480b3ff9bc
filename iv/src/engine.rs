//! InvitationEngine - drives a full run batch by batch

use std::sync::Arc;

use progressstore::{Checkpoint, CheckpointStore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::{BatchReport, ChunkProcessor};
use crate::config::RunConfig;
use crate::error::InviteError;
use crate::identity::Identity;
use crate::platform::{ChatRef, Platform, PlatformError};
use crate::state::RunState;

/// Totals of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub successes: usize,
    pub skips: usize,
    pub failures: usize,
    pub throttles: usize,
    /// Batches completed by this run
    pub batches_completed: usize,
    /// Batches in the pending sequence, retries included
    pub total_batches: usize,
    /// Pending identities passed over by the resume offset
    pub resumed_past: usize,
    pub final_delay_secs: u64,
    /// Identities skipped so far, including earlier runs
    pub skipped_total: usize,
    /// Throttled identities left for the next run
    pub requeued: usize,
    pub checkpoint_deleted: bool,
}

impl RunSummary {
    fn absorb(&mut self, report: &BatchReport) {
        self.successes += report.successes;
        self.skips += report.skips;
        self.failures += report.failures;
        self.throttles += report.throttles;
        self.batches_completed += 1;
    }
}

/// One unit of work between two checkpoint flushes
struct Batch<'a> {
    number: usize,
    identities: &'a [Identity],
    /// Position of the first identity in its list, 1-based
    first: usize,
    retry: bool,
}

/// Orchestrates a run over the pending identities
///
/// The pending sequence must already exclude identities the checkpoint
/// records as processed. Identities the checkpoint holds as requeued are
/// pulled out of it and retried after the regular batches. The engine
/// resumes the regular batches at `last_completed_batch * chunk_size`,
/// flushes the checkpoint after every batch and deletes it once the
/// sequence is exhausted and nothing is left requeued.
pub struct InvitationEngine {
    platform: Arc<dyn Platform>,
    config: RunConfig,
    store: CheckpointStore,
}

impl InvitationEngine {
    pub fn new(platform: Arc<dyn Platform>, config: RunConfig, store: CheckpointStore) -> Self {
        debug!(?config, path = ?store.path(), "InvitationEngine::new: called");
        Self {
            platform,
            config,
            store,
        }
    }

    /// Run the job to completion
    ///
    /// Errors are limited to configuration, permission and fatal platform
    /// failures; in those cases the checkpoint is left in place.
    pub async fn run(
        &self,
        chat_reference: &str,
        pending: &[Identity],
        checkpoint: Checkpoint,
    ) -> Result<RunSummary, InviteError> {
        debug!(%chat_reference, pending = pending.len(), "InvitationEngine::run: called");
        self.config.validate()?;

        let chat = self.connect(chat_reference).await?;

        let chunk_size = self.config.chunk_size;
        let mut state = RunState::resume(checkpoint, &self.config);
        let dropped = state.retain_requeued(pending);
        if dropped > 0 {
            info!("{} requeued identities are no longer in the roster", dropped);
        }
        let (first, retry) = state.split_pending(pending);
        let start = state.resume_offset(chunk_size);
        let first_batches = first.len().div_ceil(chunk_size);

        let mut batches: Vec<Batch<'_>> = (start..first.len())
            .step_by(chunk_size)
            .map(|offset| Batch {
                number: offset / chunk_size + 1,
                identities: &first[offset..(offset + chunk_size).min(first.len())],
                first: offset + 1,
                retry: false,
            })
            .collect();
        batches.extend(retry.chunks(chunk_size).enumerate().map(|(idx, identities)| Batch {
            number: first_batches + idx + 1,
            identities,
            first: idx * chunk_size + 1,
            retry: true,
        }));
        let total_batches = first_batches + retry.len().div_ceil(chunk_size);

        info!(
            "Starting processing of {} identities ({} requeued) in {} batches of {} (resuming after batch {}, delay {}s)",
            pending.len(),
            retry.len(),
            total_batches,
            chunk_size,
            state.completed_batches(),
            state.rate().current_delay_secs()
        );

        let resumed_past = start.min(first.len());
        if start > 0 {
            info!(
                "Resume offset {} passes over {} of {} pending identities",
                start,
                resumed_past,
                first.len()
            );
            if start >= first.len() {
                warn!(
                    "Resume offset {} is past the end of {} pending identities; nothing left to process",
                    start,
                    first.len()
                );
            }
        }

        let processor = ChunkProcessor::new(self.platform.as_ref(), &chat, self.config.on_throttle);
        let mut summary = RunSummary {
            total_batches,
            resumed_past,
            ..Default::default()
        };

        let count = batches.len();
        for (idx, batch) in batches.iter().enumerate() {
            let last = batch.first + batch.identities.len() - 1;
            if batch.retry {
                info!(
                    "Retrying requeued identities, batch {}/{} (retries {}-{})",
                    batch.number, total_batches, batch.first, last
                );
            } else {
                info!(
                    "Processing batch {}/{} (identities {}-{})",
                    batch.number, total_batches, batch.first, last
                );
            }

            let report = processor.process(batch.identities, &mut state).await?;
            if batch.retry {
                state.absorb_retry(&report);
            } else {
                state.absorb(&report, batch.number as u64);
            }

            if let Err(e) = self.store.save(&state.snapshot()).await {
                warn!("Failed to save checkpoint after batch {}: {:#}", batch.number, e);
            }

            info!(
                "Results for batch {}: Successes: {}, Skipped: {}, Failures: {}",
                batch.number, report.successes, report.skips, report.failures
            );
            summary.absorb(&report);

            if idx + 1 < count {
                let pause = self.config.chunk_pause();
                info!(
                    "Batch pause: {} seconds ({:.0} minutes)",
                    pause.as_secs(),
                    pause.as_secs_f64() / 60.0
                );
                tokio::time::sleep(pause).await;
            }
        }

        summary.final_delay_secs = state.rate().current_delay_secs();
        summary.skipped_total = state.skipped_count();
        summary.requeued = state.requeued_count();

        if summary.requeued > 0 {
            info!(
                "{} throttled identities are requeued; keeping checkpoint {} for the next run",
                summary.requeued,
                self.store.path().display()
            );
            return Ok(summary);
        }

        info!("All identities processed ({} recorded in total)", state.processed_count());
        summary.checkpoint_deleted = match self.store.delete().await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Failed to delete checkpoint after completion: {:#}", e);
                false
            }
        };

        Ok(summary)
    }

    /// Resolve the target chat and check the invite privilege
    async fn connect(&self, chat_reference: &str) -> Result<ChatRef, InviteError> {
        debug!(%chat_reference, "InvitationEngine::connect: called");
        let reference = chat_reference.trim();
        if reference.is_empty() {
            return Err(InviteError::Configuration("target chat is not set".to_string()));
        }

        info!("Connecting to chat: {}", reference);
        let chat = match self.platform.get_chat(reference).await {
            Ok(chat) => chat,
            Err(PlatformError::NotFound(_)) | Err(PlatformError::InvalidIdentity(_)) => {
                return Err(InviteError::Configuration(format!("chat '{}' not found", reference)));
            }
            Err(e) => return Err(e.into()),
        };

        let privileges = self.platform.self_privileges(&chat).await?;
        if !privileges.can_invite_users {
            return Err(InviteError::Permission { chat: chat.title });
        }

        info!("Connected to chat '{}' with invitation rights", chat.title);
        Ok(chat)
    }
}
