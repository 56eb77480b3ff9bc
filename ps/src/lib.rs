//! ProgressStore - durable checkpoints for resumable invitation runs
//!
//! A run walks a long list of identities in fixed-size batches. After every
//! completed batch the run's progress is flushed to a single JSON file so a
//! restarted run can pick up where the last one stopped.
//!
//! # File format
//!
//! ```text
//! {
//!   "processed": ["alice", "bob"],
//!   "skipped": ["bob"],
//!   "current_delay": 20,
//!   "last_chunk": 1,
//!   "timestamp": 1760000000
//! }
//! ```
//!
//! An optional `"requeued"` array lists throttled identities that a later run
//! must attempt again. It is omitted when empty.
//!
//! # Example
//!
//! ```ignore
//! use progressstore::CheckpointStore;
//!
//! let store = CheckpointStore::new("inviter_progress.json", 15);
//! let mut checkpoint = store.load().await;
//! checkpoint.processed.insert("alice".to_string());
//! checkpoint.last_completed_batch = 1;
//! store.save(&checkpoint).await?;
//! ```

mod checkpoint;
mod store;

pub use checkpoint::Checkpoint;
pub use store::CheckpointStore;

/// Default checkpoint file name
pub const DEFAULT_CHECKPOINT_FILE: &str = "inviter_progress.json";
