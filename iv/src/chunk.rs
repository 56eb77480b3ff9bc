//! Processing of one batch of identities

use tracing::{debug, error, info, warn};

use crate::config::ThrottlePolicy;
use crate::error::InviteError;
use crate::identity::Identity;
use crate::outcome::{Outcome, OutcomeClass, Recovery, Verdict, classify_addition, classify_resolution};
use crate::platform::{ChatRef, Platform};
use crate::state::RunState;

/// Results of one batch
///
/// `processed` lists every attempted identity in batch order, including
/// failures and skips. Throttled identities are included unless the run
/// requeues them, in which case they land in `requeued` instead.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub successes: usize,
    pub skips: usize,
    pub failures: usize,
    pub throttles: usize,
    pub processed: Vec<Identity>,
    pub skipped: Vec<Identity>,
    pub requeued: Vec<Identity>,
    pub outcomes: Vec<(Identity, Outcome)>,
}

impl BatchReport {
    /// Record a terminal outcome for an identity
    pub fn record(&mut self, identity: Identity, outcome: Outcome) {
        match outcome.class() {
            OutcomeClass::Success => self.successes += 1,
            OutcomeClass::Skip => {
                self.skips += 1;
                self.skipped.push(identity.clone());
            }
            OutcomeClass::Failure => self.failures += 1,
        }
        self.processed.push(identity.clone());
        self.outcomes.push((identity, outcome));
    }

    /// Record a throttled identity
    pub fn record_throttle(&mut self, identity: Identity, policy: ThrottlePolicy) {
        self.throttles += 1;
        match policy {
            ThrottlePolicy::MarkProcessed => self.processed.push(identity),
            ThrottlePolicy::Requeue => self.requeued.push(identity),
        }
    }
}

/// Drives the identities of a batch through the invitation state machine
///
/// Identities are handled strictly in order, one remote call at a time.
/// Only a fatal platform error escapes; everything else is captured as the
/// identity's outcome.
pub struct ChunkProcessor<'a> {
    platform: &'a dyn Platform,
    chat: &'a ChatRef,
    on_throttle: ThrottlePolicy,
}

impl<'a> ChunkProcessor<'a> {
    pub fn new(platform: &'a dyn Platform, chat: &'a ChatRef, on_throttle: ThrottlePolicy) -> Self {
        debug!(chat = %chat.title, ?on_throttle, "ChunkProcessor::new: called");
        Self {
            platform,
            chat,
            on_throttle,
        }
    }

    /// Process a batch, pacing after each invitation
    pub async fn process(&self, batch: &[Identity], state: &mut RunState) -> Result<BatchReport, InviteError> {
        debug!(batch_len = batch.len(), "ChunkProcessor::process: called");
        let mut report = BatchReport::default();

        for (idx, identity) in batch.iter().enumerate() {
            info!("Processing {}/{}: {}", idx + 1, batch.len(), identity);

            let verdict = self.dispatch(identity).await;
            let recovery = verdict.recovery();

            match verdict {
                Verdict::Settled(outcome) => {
                    match &outcome {
                        Outcome::Invited => info!("Invited {}", identity),
                        Outcome::AlreadyMember => info!("{} is already in the chat, skipping", identity),
                        Outcome::PrivacyRestricted => info!("{} has privacy restrictions, skipping", identity),
                        Outcome::InvalidIdentity => warn!("{}: invalid identity or not found", identity),
                        Outcome::UnknownError(message) => warn!("Unexpected error for {}: {}", identity, message),
                    }
                    report.record(identity.clone(), outcome);
                }
                Verdict::Throttled { wait } => {
                    warn!("Flood wait while processing {}: waiting {}s", identity, wait.as_secs());
                    report.record_throttle(identity.clone(), self.on_throttle);
                }
                Verdict::Fatal(err) => {
                    error!("Fatal platform error while processing {}: {}", identity, err);
                    return Err(err.into());
                }
            }

            match recovery {
                Recovery::Pace => {
                    let delay = state.rate().current_delay();
                    info!("Waiting {}s before the next invitation", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
                Recovery::WaitAndEscalate(wait) => {
                    tokio::time::sleep(wait).await;
                    let delay = state.rate_mut().on_throttle_signal();
                    if state.rate().at_cap() {
                        warn!("Delay is at its maximum of {}s", delay);
                    } else {
                        info!("Delay increased to {}s", delay);
                    }
                }
                Recovery::Continue | Recovery::Abort => {}
            }
        }

        Ok(report)
    }

    /// Resolve, check membership, then invite
    async fn dispatch(&self, identity: &Identity) -> Verdict {
        debug!(%identity, "ChunkProcessor::dispatch: called");
        let account = match self.platform.resolve_identity(identity).await {
            Ok(account) => account,
            Err(e) => {
                debug!(%identity, error = %e, "ChunkProcessor::dispatch: resolution failed");
                return classify_resolution(e);
            }
        };

        match self.platform.membership(self.chat, &account).await {
            Ok(Some(status)) if status.is_participant() => {
                debug!(%identity, ?status, "ChunkProcessor::dispatch: already a participant");
                return Verdict::Settled(Outcome::AlreadyMember);
            }
            Ok(status) => {
                debug!(%identity, ?status, "ChunkProcessor::dispatch: not a participant");
            }
            Err(e) if e.is_fatal() || e.is_rate_limit() => return classify_resolution(e),
            Err(e) => {
                debug!(%identity, error = %e, "ChunkProcessor::dispatch: membership unknown, inviting anyway");
            }
        }

        classify_addition(self.platform.add_member(self.chat, &account).await)
    }
}
