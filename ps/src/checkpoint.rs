//! Checkpoint record and its on-disk representation

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Durable record of a run's progress
///
/// `processed` holds every identity that was attempted, whatever the result.
/// `skipped` is the subset that was skipped (already a member, privacy
/// restricted). `requeued` holds identities that were throttled but must be
/// attempted again; they are never in `processed`. `last_completed_batch`
/// counts fully completed batches and is only used to compute the resume
/// offset of the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Identities attempted so far
    #[serde(default)]
    pub processed: BTreeSet<String>,

    /// Identities skipped so far (always a subset of `processed`)
    #[serde(default)]
    pub skipped: BTreeSet<String>,

    /// Throttled identities waiting for another attempt
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub requeued: BTreeSet<String>,

    /// Inter-invitation delay in effect when the checkpoint was written
    #[serde(rename = "current_delay")]
    pub current_delay_secs: u64,

    /// Number of fully completed batches
    #[serde(rename = "last_chunk")]
    pub last_completed_batch: u64,

    /// Unix timestamp (seconds) of the save
    #[serde(rename = "timestamp", default)]
    pub saved_at: i64,
}

impl Checkpoint {
    /// Create an empty checkpoint seeded with the initial delay
    pub fn fresh(initial_delay_secs: u64) -> Self {
        debug!(initial_delay_secs, "Checkpoint::fresh: called");
        Self {
            processed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            requeued: BTreeSet::new(),
            current_delay_secs: initial_delay_secs,
            last_completed_batch: 0,
            saved_at: 0,
        }
    }

    /// True if no batch has been completed and nothing was processed
    pub fn is_fresh(&self) -> bool {
        self.processed.is_empty()
            && self.skipped.is_empty()
            && self.requeued.is_empty()
            && self.last_completed_batch == 0
    }

    /// Restore `skipped ⊆ processed` and keep `requeued` disjoint from
    /// `processed`, returning how many entries were changed
    pub fn repair(&mut self) -> usize {
        debug!("Checkpoint::repair: called");
        let missing: Vec<String> = self.skipped.difference(&self.processed).cloned().collect();
        let before = self.requeued.len();
        self.processed.extend(missing.iter().cloned());
        self.requeued.retain(|identity| !self.processed.contains(identity));
        missing.len() + (before - self.requeued.len())
    }

    /// Set `saved_at` to the current time
    pub fn stamp(&mut self) {
        self.saved_at = chrono::Utc::now().timestamp();
    }

    /// Saved-at time rendered for display, if the checkpoint was ever saved
    pub fn saved_at_display(&self) -> Option<String> {
        if self.saved_at <= 0 {
            return None;
        }
        chrono::DateTime::from_timestamp(self.saved_at, 0).map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    }
}
