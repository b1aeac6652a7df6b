//! Deposit listener: the poll → translate → route loop
//!
//! One listener runs per source chain, as a single tokio task. Each cycle it
//! fetches the pending deposits, translates them in feed order and hands the
//! resulting messages to the router.
//!
//! ## Failure policy
//!
//! - A deposit that fails translation, or a message the router rejects, is
//!   logged and skipped. It never affects the rest of the batch or the retry
//!   budget.
//! - A failed fetch (or an unavailable router) consumes one unit of the retry
//!   budget and the loop sleeps a constant retry interval. A successful cycle
//!   restores the full budget.
//! - When the budget reaches zero the listener reports
//!   [`ListenerError::FatalPolling`] on its one-shot channel exactly once and
//!   returns [`PollOutcome::Fatal`]. Restart/exit is the supervisor's call.
//! - Cancellation is checked at the top of every cycle and raced against every
//!   wait; it yields [`PollOutcome::Terminated`] and never a fatal report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bounded_cache::SeenDeposits;
use crate::config::ChainConfig;
use crate::deposit::RawDeposit;
use crate::error::{DispatchError, ListenerError};
use crate::metrics;
use crate::router::Router;
use crate::source::DepositSource;
use crate::translator::DepositTranslator;

// ============================================================================
// Policy
// ============================================================================

/// How the listener treats the feed once a fetch has succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollMode {
    /// Fetch until one batch has been processed, then idle until stopped
    #[default]
    OneShot,
    /// Fetch every idle interval, skipping deposits already processed
    Continuous,
}

/// Retry and pacing parameters, owned by each listener instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Consecutive failed cycles tolerated before the listener gives up
    pub retry_limit: u32,
    /// Constant backoff after a failed cycle
    pub retry_interval: Duration,
    /// Pause between successful cycles
    pub idle_interval: Duration,
    pub mode: PollMode,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 5,
            retry_interval: Duration::from_secs(5),
            idle_interval: Duration::from_secs(5),
            mode: PollMode::OneShot,
        }
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    Polling,
    Retrying,
    Draining,
    Stopped,
    Fatal,
}

/// How the poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Cancellation was observed
    Terminated,
    /// Retry budget exhausted; the fatal error has been reported
    Fatal,
}

/// Per-batch tallies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub routed: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub dispatch_failed: usize,
    pub duplicates: usize,
}

/// Listener status, shared with the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ListenerStats {
    pub chain_id: u8,
    pub chain_name: String,
    pub state: ListenerState,
    pub retries_remaining: u32,
    pub cycles: u64,
    pub deposits_fetched: u64,
    pub messages_routed: u64,
    pub last_successful_poll: Option<DateTime<Utc>>,
}

pub type SharedStats = Arc<RwLock<ListenerStats>>;

/// Retry bookkeeping, touched only by the listener task
#[derive(Debug)]
struct RetryState {
    remaining: u32,
    initial_fetch_done: bool,
}

// ============================================================================
// Listener
// ============================================================================

pub struct Listener {
    chain: Arc<ChainConfig>,
    translator: DepositTranslator,
    source: Arc<dyn DepositSource>,
    router: Arc<dyn Router>,
    policy: PollPolicy,
    stop: CancellationToken,
    sys_err: Option<oneshot::Sender<ListenerError>>,
    seen: Option<SeenDeposits>,
    stats: SharedStats,
}

impl Listener {
    /// Create a listener with the default policy.
    ///
    /// `stop` cancels the loop; `sys_err` receives the fatal polling error if
    /// the retry budget is exhausted.
    pub fn new(
        chain: Arc<ChainConfig>,
        source: Arc<dyn DepositSource>,
        router: Arc<dyn Router>,
        stop: CancellationToken,
        sys_err: oneshot::Sender<ListenerError>,
    ) -> Self {
        let policy = PollPolicy::default();
        let stats = Arc::new(RwLock::new(ListenerStats {
            chain_id: chain.id().as_u8(),
            chain_name: chain.name().to_string(),
            state: ListenerState::Polling,
            retries_remaining: policy.retry_limit,
            cycles: 0,
            deposits_fetched: 0,
            messages_routed: 0,
            last_successful_poll: None,
        }));

        Self {
            translator: DepositTranslator::new(chain.id()),
            chain,
            source,
            router,
            policy,
            stop,
            sys_err: Some(sys_err),
            seen: None,
            stats,
        }
    }

    /// Replace the poll policy. Continuous mode enables deduplication with
    /// default bounds unless [`Listener::with_dedupe`] is also used.
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        if policy.mode == PollMode::Continuous && self.seen.is_none() {
            self.seen = Some(SeenDeposits::default());
        }
        self.policy = policy;
        self
    }

    pub fn with_dedupe(mut self, seen: SeenDeposits) -> Self {
        self.seen = Some(seen);
        self
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    /// Spawn the poll loop on its own task
    pub fn start(self) -> JoinHandle<PollOutcome> {
        debug!(chain_id = %self.chain.id(), "Starting listener...");
        tokio::spawn(self.poll_deposits())
    }

    /// Run the poll loop until cancelled or the retry budget is exhausted
    pub async fn poll_deposits(mut self) -> PollOutcome {
        info!(
            chain_id = %self.chain.id(),
            chain = %self.chain.name(),
            retry_limit = self.policy.retry_limit,
            retry_interval_ms = duration_ms(self.policy.retry_interval),
            mode = ?self.policy.mode,
            "Polling deposits..."
        );
        metrics::set_up(true);

        let outcome = self.run_cycles().await;

        metrics::set_up(false);
        outcome
    }

    async fn run_cycles(&mut self) -> PollOutcome {
        let mut retry = RetryState {
            remaining: self.policy.retry_limit,
            initial_fetch_done: false,
        };
        self.publish_retries(retry.remaining).await;

        loop {
            if self.stop.is_cancelled() {
                info!(chain_id = %self.chain.id(), "Polling terminated");
                self.set_state(ListenerState::Stopped).await;
                return PollOutcome::Terminated;
            }

            if self.policy.mode == PollMode::OneShot && retry.initial_fetch_done {
                self.sleep_or_stop(self.policy.idle_interval).await;
                continue;
            }

            self.set_state(ListenerState::Polling).await;
            let fetched = tokio::select! {
                biased;
                _ = self.stop.cancelled() => continue,
                result = self.source.fetch_batch() => result,
            };

            let failure = match fetched {
                Ok(batch) => {
                    self.set_state(ListenerState::Draining).await;
                    match self.process_batch(batch).await {
                        Ok(report) => {
                            retry.remaining = self.policy.retry_limit;
                            retry.initial_fetch_done = true;
                            self.record_success(&report, retry.remaining).await;
                            self.set_state(ListenerState::Polling).await;

                            if self.policy.mode == PollMode::Continuous {
                                self.sleep_or_stop(self.policy.idle_interval).await;
                            }
                            continue;
                        }
                        Err(e) => {
                            error!(
                                chain_id = %self.chain.id(),
                                error = %e,
                                "Failed to process deposit batch"
                            );
                            e.to_string()
                        }
                    }
                }
                Err(e) => {
                    error!(
                        chain_id = %self.chain.id(),
                        error = %e,
                        "Unable to get deposits"
                    );
                    metrics::record_fetch_failure(self.chain.name());
                    e.to_string()
                }
            };

            retry.remaining = retry.remaining.saturating_sub(1);
            self.publish_retries(retry.remaining).await;

            if retry.remaining == 0 {
                error!(
                    chain_id = %self.chain.id(),
                    attempts = self.policy.retry_limit,
                    "Polling failed, retries exceeded"
                );
                self.report_fatal(ListenerError::FatalPolling {
                    attempts: self.policy.retry_limit,
                    last_error: failure,
                });
                self.set_state(ListenerState::Fatal).await;
                return PollOutcome::Fatal;
            }

            warn!(
                chain_id = %self.chain.id(),
                retries_remaining = retry.remaining,
                backoff_ms = duration_ms(self.policy.retry_interval),
                "Retrying deposit poll after backoff"
            );
            self.set_state(ListenerState::Retrying).await;
            self.sleep_or_stop(self.policy.retry_interval).await;
        }
    }

    /// Translate and route one batch in feed order.
    ///
    /// Record-level failures are logged and counted. Only an unavailable
    /// router aborts the batch; records not reached stay unmarked so they are
    /// delivered again on the next fetch.
    async fn process_batch(&mut self, batch: Vec<RawDeposit>) -> Result<BatchReport, DispatchError> {
        let chain = self.chain.name().to_string();
        let mut report = BatchReport {
            fetched: batch.len(),
            ..Default::default()
        };

        debug!(chain_id = %self.chain.id(), deposits = batch.len(), "Processing deposits");
        metrics::record_deposits_fetched(&chain, batch.len());

        for deposit in batch {
            if self.seen.as_ref().is_some_and(|s| s.contains(&deposit.id)) {
                report.duplicates += 1;
                metrics::record_deposit_skipped(&chain, "duplicate");
                continue;
            }

            match self.translator.translate(&deposit) {
                Ok(None) => {
                    report.skipped += 1;
                    metrics::record_deposit_skipped(&chain, "unknown_kind");
                }
                Err(e) => {
                    error!(
                        deposit_id = %deposit.id,
                        nonce = %deposit.nonce,
                        dest = %deposit.destination_chain_id,
                        error = %e,
                        "Failed to translate deposit"
                    );
                    report.invalid += 1;
                    metrics::record_translation_error(&chain, e.reason());
                }
                Ok(Some(message)) => {
                    let kind = message.transfer_type();
                    match self.router.send(message).await {
                        Ok(()) => {
                            report.routed += 1;
                            metrics::record_message_routed(&chain, kind.as_str(), true);
                        }
                        Err(e) if e.is_batch_level() => {
                            metrics::record_message_routed(&chain, kind.as_str(), false);
                            return Err(e);
                        }
                        Err(e) => {
                            error!(
                                deposit_id = %deposit.id,
                                nonce = %deposit.nonce,
                                dest = %deposit.destination_chain_id,
                                error = %e,
                                "Failed to route message"
                            );
                            report.dispatch_failed += 1;
                            metrics::record_message_routed(&chain, kind.as_str(), false);
                        }
                    }
                }
            }

            if let Some(seen) = self.seen.as_mut() {
                seen.insert(&deposit.id);
            }
        }

        info!(
            chain_id = %self.chain.id(),
            fetched = report.fetched,
            routed = report.routed,
            skipped = report.skipped,
            invalid = report.invalid,
            dispatch_failed = report.dispatch_failed,
            duplicates = report.duplicates,
            "Deposit batch processed"
        );

        Ok(report)
    }

    fn report_fatal(&mut self, err: ListenerError) {
        match self.sys_err.take() {
            Some(tx) => {
                if tx.send(err).is_err() {
                    warn!("Supervisor dropped the fatal error receiver");
                }
            }
            None => warn!("Fatal polling error already reported"),
        }
    }

    /// Sleep, waking early on cancellation
    async fn sleep_or_stop(&self, duration: Duration) {
        tokio::select! {
            _ = self.stop.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }

    async fn set_state(&self, state: ListenerState) {
        self.stats.write().await.state = state;
    }

    async fn publish_retries(&self, remaining: u32) {
        self.stats.write().await.retries_remaining = remaining;
        metrics::set_retries_remaining(self.chain.name(), remaining);
    }

    async fn record_success(&self, report: &BatchReport, remaining: u32) {
        {
            let mut stats = self.stats.write().await;
            stats.cycles += 1;
            stats.deposits_fetched += report.fetched as u64;
            stats.messages_routed += report.routed as u64;
            stats.retries_remaining = remaining;
            stats.last_successful_poll = Some(Utc::now());
        }
        metrics::set_retries_remaining(self.chain.name(), remaining);
        metrics::record_successful_poll(self.chain.name());
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
