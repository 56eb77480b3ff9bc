//! Progress of a single run
//!
//! The engine owns one [`RunState`] for the whole run and lends it to the
//! chunk processor batch by batch.

use std::collections::HashSet;

use progressstore::Checkpoint;
use tracing::debug;

use crate::chunk::BatchReport;
use crate::config::RunConfig;
use crate::identity::Identity;
use crate::rate::RateController;

/// Accumulated progress plus the pacing state of the run
#[derive(Debug)]
pub struct RunState {
    progress: Checkpoint,
    rate: RateController,
}

impl RunState {
    /// Resume from a loaded checkpoint; its delay seeds the rate controller
    pub fn resume(checkpoint: Checkpoint, config: &RunConfig) -> Self {
        debug!(
            processed = checkpoint.processed.len(),
            last_batch = checkpoint.last_completed_batch,
            "RunState::resume: called"
        );
        let rate = RateController::resume(config, checkpoint.current_delay_secs);
        Self {
            progress: checkpoint,
            rate,
        }
    }

    pub fn rate(&self) -> &RateController {
        &self.rate
    }

    pub fn rate_mut(&mut self) -> &mut RateController {
        &mut self.rate
    }

    /// Batches completed before this run started or during it
    pub fn completed_batches(&self) -> u64 {
        self.progress.last_completed_batch
    }

    /// Position in the pending sequence where the run resumes
    pub fn resume_offset(&self, chunk_size: usize) -> usize {
        usize::try_from(self.progress.last_completed_batch)
            .unwrap_or(usize::MAX)
            .saturating_mul(chunk_size)
    }

    pub fn is_processed(&self, identity: &Identity) -> bool {
        self.progress.processed.contains(identity.as_str())
    }

    pub fn processed_count(&self) -> usize {
        self.progress.processed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.progress.skipped.len()
    }

    pub fn is_requeued(&self, identity: &Identity) -> bool {
        self.progress.requeued.contains(identity.as_str())
    }

    pub fn requeued_count(&self) -> usize {
        self.progress.requeued.len()
    }

    /// Forget requeued identities that are no longer pending, returning how many were dropped
    pub fn retain_requeued(&mut self, pending: &[Identity]) -> usize {
        let before = self.progress.requeued.len();
        let pending: HashSet<&str> = pending.iter().map(Identity::as_str).collect();
        self.progress.requeued.retain(|handle| pending.contains(handle.as_str()));
        let dropped = before - self.progress.requeued.len();
        debug!(dropped, "RunState::retain_requeued: pruned");
        dropped
    }

    /// Split pending identities into first attempts and requeued retries, keeping order
    ///
    /// The resume offset only applies to the first list.
    pub fn split_pending(&self, pending: &[Identity]) -> (Vec<Identity>, Vec<Identity>) {
        pending.iter().cloned().partition(|identity| !self.is_requeued(identity))
    }

    /// Merge a finished batch and mark it completed
    pub fn absorb(&mut self, report: &BatchReport, batch_number: u64) {
        debug!(batch_number, "RunState::absorb: called");
        self.merge(report);
        self.progress.last_completed_batch = batch_number;
    }

    /// Merge a finished retry batch; the completed batch count is unchanged
    pub fn absorb_retry(&mut self, report: &BatchReport) {
        debug!("RunState::absorb_retry: called");
        self.merge(report);
    }

    fn merge(&mut self, report: &BatchReport) {
        debug!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            requeued = report.requeued.len(),
            "RunState::merge: called"
        );
        for identity in &report.processed {
            self.progress.requeued.remove(identity.as_str());
            self.progress.processed.insert(identity.as_str().to_string());
        }
        self.progress
            .skipped
            .extend(report.skipped.iter().map(|i| i.as_str().to_string()));
        self.progress
            .requeued
            .extend(report.requeued.iter().map(|i| i.as_str().to_string()));
        self.progress.current_delay_secs = self.rate.current_delay_secs();
    }

    /// Checkpoint of the current progress, stamped with the current time
    pub fn snapshot(&self) -> Checkpoint {
        let mut checkpoint = self.progress.clone();
        checkpoint.current_delay_secs = self.rate.current_delay_secs();
        checkpoint.stamp();
        checkpoint
    }
}
