//! File-backed checkpoint store

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::Checkpoint;

/// Reads and writes a single checkpoint file
///
/// Loading never fails: a missing file yields a fresh checkpoint and an
/// unreadable or corrupted one is reported and replaced by a fresh one.
pub struct CheckpointStore {
    path: PathBuf,
    initial_delay_secs: u64,
}

impl CheckpointStore {
    /// Create a store for the given file; `initial_delay_secs` seeds fresh checkpoints
    pub fn new(path: impl Into<PathBuf>, initial_delay_secs: u64) -> Self {
        let path = path.into();
        debug!(?path, initial_delay_secs, "CheckpointStore::new: called");
        Self {
            path,
            initial_delay_secs,
        }
    }

    /// Path of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a checkpoint file is present
    ///
    /// Errors other than "not found" (permissions, a file where a directory
    /// is expected) are returned rather than read as absence.
    pub async fn exists(&self) -> Result<bool> {
        fs::try_exists(&self.path)
            .await
            .context(format!("Failed to check checkpoint {}", self.path.display()))
    }

    /// Load the persisted checkpoint, falling back to a fresh one
    pub async fn load(&self) -> Checkpoint {
        debug!(path = ?self.path, "CheckpointStore::load: called");
        match self.try_load().await {
            Ok(Some(mut checkpoint)) => {
                let repaired = checkpoint.repair();
                if repaired > 0 {
                    warn!(repaired, "Checkpoint had skipped entries missing from processed; repaired");
                }
                info!(
                    processed = checkpoint.processed.len(),
                    skipped = checkpoint.skipped.len(),
                    last_batch = checkpoint.last_completed_batch,
                    delay_secs = checkpoint.current_delay_secs,
                    "Loaded checkpoint from {}",
                    self.path.display()
                );
                checkpoint
            }
            Ok(None) => {
                debug!("CheckpointStore::load: no checkpoint file, starting fresh");
                Checkpoint::fresh(self.initial_delay_secs)
            }
            Err(e) => {
                warn!(
                    "Checkpoint {} is unreadable or corrupted ({:#}); starting from a fresh checkpoint",
                    self.path.display(),
                    e
                );
                Checkpoint::fresh(self.initial_delay_secs)
            }
        }
    }

    /// Load the persisted checkpoint, surfacing read and parse errors
    ///
    /// Returns `Ok(None)` when no file exists.
    pub async fn try_load(&self) -> Result<Option<Checkpoint>> {
        debug!(path = ?self.path, "CheckpointStore::try_load: called");
        if !self.exists().await? {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .await
            .context(format!("Failed to read checkpoint {}", self.path.display()))?;
        let checkpoint: Checkpoint = serde_json::from_str(&content).context("Failed to parse checkpoint")?;
        Ok(Some(checkpoint))
    }

    /// Persist the checkpoint atomically (temp file + rename)
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        debug!(
            path = ?self.path,
            processed = checkpoint.processed.len(),
            last_batch = checkpoint.last_completed_batch,
            "CheckpointStore::save: called"
        );

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create checkpoint directory")?;
        }

        let content = serde_json::to_string_pretty(checkpoint)?;
        let tmp_path = self.tmp_path();

        let mut file = fs::File::create(&tmp_path)
            .await
            .context(format!("Failed to create {}", tmp_path.display()))?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .await
            .context(format!("Failed to move checkpoint into {}", self.path.display()))?;

        debug!("CheckpointStore::save: checkpoint written");
        Ok(())
    }

    /// Remove the checkpoint file, returning whether one existed
    pub async fn delete(&self) -> Result<bool> {
        debug!(path = ?self.path, "CheckpointStore::delete: called");
        if !self.exists().await? {
            debug!("CheckpointStore::delete: nothing to delete");
            return Ok(false);
        }

        fs::remove_file(&self.path)
            .await
            .context(format!("Failed to delete checkpoint {}", self.path.display()))?;
        info!("Deleted checkpoint {}", self.path.display());
        Ok(true)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
