//! Listener tests
//!
//! Drive the poll loop end to end with in-memory deposit sources and routers.
//! Intervals are shortened to milliseconds so retry and idle paths run fast.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deposit_relayer::deposit::FungiblePayload;
use deposit_relayer::listener::ListenerState;
use deposit_relayer::{
    parse_chain_config, ChainConfig, ChainId, DepositSource, DispatchError, FetchError, Listener,
    ListenerError, Message, Nonce, PollMode, PollOutcome, PollPolicy, RawChainConfig, RawDeposit,
    Router,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Fixtures
// ============================================================================

fn chain_config() -> Arc<ChainConfig> {
    let raw = RawChainConfig {
        name: "proxy".into(),
        id: 1,
        endpoint: "http://localhost:8545".into(),
        opts: HashMap::from([("test".to_string(), "true".to_string())]),
        ..Default::default()
    };
    Arc::new(parse_chain_config(raw).unwrap())
}

fn policy(retry_limit: u32, mode: PollMode) -> PollPolicy {
    PollPolicy {
        retry_limit,
        retry_interval: Duration::from_millis(10),
        idle_interval: Duration::from_millis(10),
        mode,
    }
}

fn fungible(id: &str, nonce: u64, dest: u8, amount: &str) -> RawDeposit {
    RawDeposit {
        id: id.into(),
        nonce: nonce.to_string(),
        from_address: "0x1111111111111111111111111111111111111111".into(),
        destination_chain_id: dest.to_string(),
        destination_recipient_address: "0xabc0000000000000000000000000000000000123".into(),
        kind: "fungible".into(),
        resource_id: "0x0000000000000000000000000000000000000000000000000000000000000001"
            .into(),
        fungible: FungiblePayload {
            amount: amount.into(),
        },
        ..Default::default()
    }
}

async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Sources
// ============================================================================

/// Fails every fetch
#[derive(Default)]
struct FailingSource {
    calls: AtomicUsize,
}

#[async_trait]
impl DepositSource for FailingSource {
    async fn fetch_batch(&self) -> Result<Vec<RawDeposit>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Unavailable("connection refused".into()))
    }
}

/// Returns the same batch on every fetch
struct StaticSource {
    batch: Vec<RawDeposit>,
    calls: AtomicUsize,
}

impl StaticSource {
    fn new(batch: Vec<RawDeposit>) -> Self {
        Self {
            batch,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DepositSource for StaticSource {
    async fn fetch_batch(&self) -> Result<Vec<RawDeposit>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.batch.clone())
    }
}

/// Plays back a fixed script, then fails
#[derive(Default)]
struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<RawDeposit>, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn push(self, step: Result<Vec<RawDeposit>, FetchError>) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }
}

#[async_trait]
impl DepositSource for ScriptedSource {
    async fn fetch_batch(&self) -> Result<Vec<RawDeposit>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Unavailable("script exhausted".into())))
    }
}

/// Never answers
struct PendingSource;

#[async_trait]
impl DepositSource for PendingSource {
    async fn fetch_batch(&self) -> Result<Vec<RawDeposit>, FetchError> {
        std::future::pending().await
    }
}

// ============================================================================
// Routers
// ============================================================================

/// Records messages; rejects destinations listed in `rejected`
#[derive(Default)]
struct RecordingRouter {
    messages: Mutex<Vec<Message>>,
    rejected: HashSet<u8>,
}

impl RecordingRouter {
    fn rejecting(dests: &[u8]) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            rejected: dests.iter().copied().collect(),
        }
    }

    fn nonces(&self) -> Vec<u64> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.nonce().0)
            .collect()
    }

    fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl Router for RecordingRouter {
    async fn send(&self, message: Message) -> Result<(), DispatchError> {
        let dest = message.destination();
        if self.rejected.contains(&dest.0) {
            return Err(DispatchError::UnknownDestination(dest));
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// Router that is down for everything
#[derive(Default)]
struct UnavailableRouter {
    attempts: AtomicUsize,
}

#[async_trait]
impl Router for UnavailableRouter {
    async fn send(&self, _message: Message) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DispatchError::Unavailable("writer pool shut down".into()))
    }
}

// ============================================================================
// Retry budget and fatal escalation
// ============================================================================

#[tokio::test]
async fn test_fatal_after_retry_budget_exhausted() {
    let source = Arc::new(FailingSource::default());
    let router = Arc::new(RecordingRouter::default());
    let (sys_err_tx, sys_err_rx) = oneshot::channel();

    let listener = Listener::new(
        chain_config(),
        source.clone(),
        router.clone(),
        CancellationToken::new(),
        sys_err_tx,
    )
    .with_policy(policy(3, PollMode::OneShot));
    let stats = listener.stats();

    let outcome = tokio::time::timeout(WAIT, listener.poll_deposits())
        .await
        .expect("listener should give up");

    assert_eq!(outcome, PollOutcome::Fatal);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert_eq!(router.len(), 0);

    match sys_err_rx.await {
        Ok(ListenerError::FatalPolling {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("connection refused"));
        }
        other => panic!("expected exactly one fatal report, got {:?}", other),
    }

    let stats = stats.read().await;
    assert_eq!(stats.state, ListenerState::Fatal);
    assert_eq!(stats.retries_remaining, 0);
}

#[tokio::test]
async fn test_success_restores_retry_budget() {
    let source = Arc::new(
        ScriptedSource::default()
            .push(Err(FetchError::Unavailable("blip".into())))
            .push(Err(FetchError::Unavailable("blip".into())))
            .push(Ok(vec![fungible("a", 1, 2, "10")])),
    );
    let router = Arc::new(RecordingRouter::default());
    let stop = CancellationToken::new();
    let (sys_err_tx, _sys_err_rx) = oneshot::channel();

    let listener = Listener::new(
        chain_config(),
        source.clone(),
        router.clone(),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(policy(3, PollMode::OneShot));
    let stats = listener.stats();
    let handle = listener.start();

    wait_until(|| router.len() == 1).await;
    // Two failures out of a budget of three did not kill the loop
    wait_until(|| stats.try_read().is_ok_and(|s| s.cycles == 1)).await;
    assert_eq!(stats.read().await.retries_remaining, 3);

    stop.cancel();
    let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(outcome, PollOutcome::Terminated);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unavailable_router_consumes_retry_budget() {
    let source = Arc::new(StaticSource::new(vec![fungible("a", 1, 2, "10")]));
    let router = Arc::new(UnavailableRouter::default());
    let (sys_err_tx, sys_err_rx) = oneshot::channel();

    let listener = Listener::new(
        chain_config(),
        source.clone(),
        router.clone(),
        CancellationToken::new(),
        sys_err_tx,
    )
    .with_policy(policy(2, PollMode::Continuous));

    let outcome = tokio::time::timeout(WAIT, listener.poll_deposits())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Fatal);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    // The deposit was never marked processed, so it was offered again
    assert_eq!(router.attempts.load(Ordering::SeqCst), 2);

    let ListenerError::FatalPolling { last_error, .. } = sys_err_rx.await.unwrap();
    assert!(last_error.contains("router unavailable"));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_before_first_fetch_terminates() {
    let source = Arc::new(FailingSource::default());
    let stop = CancellationToken::new();
    let (sys_err_tx, sys_err_rx) = oneshot::channel();

    let listener = Listener::new(
        chain_config(),
        source.clone(),
        Arc::new(RecordingRouter::default()),
        stop.clone(),
        sys_err_tx,
    );
    let stats = listener.stats();

    stop.cancel();
    let outcome = listener.poll_deposits().await;

    assert_eq!(outcome, PollOutcome::Terminated);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    // Sender dropped without a report
    assert!(sys_err_rx.await.is_err());
    assert_eq!(stats.read().await.state, ListenerState::Stopped);
}

#[tokio::test]
async fn test_cancel_interrupts_pending_fetch() {
    let stop = CancellationToken::new();
    let (sys_err_tx, sys_err_rx) = oneshot::channel();

    let handle = Listener::new(
        chain_config(),
        Arc::new(PendingSource),
        Arc::new(RecordingRouter::default()),
        stop.clone(),
        sys_err_tx,
    )
    .start();

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.cancel();
    // Cancelling twice is harmless
    stop.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("cancellation should not wait for the fetch")
        .unwrap();
    assert_eq!(outcome, PollOutcome::Terminated);
    assert!(sys_err_rx.await.is_err());
}

#[tokio::test]
async fn test_cancel_during_retry_backoff() {
    let source = Arc::new(FailingSource::default());
    let stop = CancellationToken::new();
    let (sys_err_tx, sys_err_rx) = oneshot::channel();

    let handle = Listener::new(
        chain_config(),
        source.clone(),
        Arc::new(RecordingRouter::default()),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(PollPolicy {
        retry_interval: Duration::from_secs(60),
        ..PollPolicy::default()
    })
    .start();

    wait_until(|| source.calls.load(Ordering::SeqCst) == 1).await;
    stop.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("backoff sleep should observe cancellation")
        .unwrap();
    assert_eq!(outcome, PollOutcome::Terminated);
    assert!(sys_err_rx.await.is_err());
}

// ============================================================================
// Batch processing
// ============================================================================

#[tokio::test]
async fn test_invalid_record_does_not_abort_batch() {
    let source = Arc::new(StaticSource::new(vec![
        fungible("a", 1, 2, "100"),
        fungible("b", 2, 2, "not-a-number"),
        fungible("c", 3, 2, "300"),
    ]));
    let router = Arc::new(RecordingRouter::default());
    let stop = CancellationToken::new();
    let (sys_err_tx, _sys_err_rx) = oneshot::channel();

    let listener = Listener::new(
        chain_config(),
        source.clone(),
        router.clone(),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(policy(5, PollMode::OneShot));
    let stats = listener.stats();
    let handle = listener.start();

    wait_until(|| stats.try_read().is_ok_and(|s| s.cycles == 1)).await;
    stop.cancel();
    handle.await.unwrap();

    assert_eq!(router.nonces(), vec![1, 3]);
    let stats = stats.read().await;
    assert_eq!(stats.retries_remaining, 5);
    assert_eq!(stats.deposits_fetched, 3);
    assert_eq!(stats.messages_routed, 2);
}

#[tokio::test]
async fn test_rejected_message_does_not_abort_batch() {
    let source = Arc::new(StaticSource::new(vec![
        fungible("a", 1, 2, "1"),
        fungible("b", 2, 9, "1"),
        fungible("c", 3, 2, "1"),
    ]));
    let router = Arc::new(RecordingRouter::rejecting(&[9]));
    let stop = CancellationToken::new();
    let (sys_err_tx, _sys_err_rx) = oneshot::channel();

    let listener = Listener::new(
        chain_config(),
        source.clone(),
        router.clone(),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(policy(5, PollMode::OneShot));
    let stats = listener.stats();
    let handle = listener.start();

    wait_until(|| stats.try_read().is_ok_and(|s| s.cycles == 1)).await;
    stop.cancel();
    assert_eq!(handle.await.unwrap(), PollOutcome::Terminated);

    assert_eq!(router.nonces(), vec![1, 3]);
    assert_eq!(stats.read().await.retries_remaining, 5);
}

#[tokio::test]
async fn test_unknown_kind_is_skipped() {
    let mut unknown = fungible("b", 2, 2, "1");
    unknown.kind = "semi-fungible".into();

    let source = Arc::new(StaticSource::new(vec![
        fungible("a", 1, 2, "1"),
        unknown,
        fungible("c", 3, 2, "1"),
    ]));
    let router = Arc::new(RecordingRouter::default());
    let stop = CancellationToken::new();
    let (sys_err_tx, sys_err_rx) = oneshot::channel();

    let handle = Listener::new(
        chain_config(),
        source.clone(),
        router.clone(),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(policy(5, PollMode::OneShot))
    .start();

    wait_until(|| router.len() == 2).await;
    stop.cancel();
    assert_eq!(handle.await.unwrap(), PollOutcome::Terminated);
    assert_eq!(router.nonces(), vec![1, 3]);
    assert!(sys_err_rx.await.is_err());
}

#[tokio::test]
async fn test_feed_order_is_preserved() {
    let batch: Vec<RawDeposit> = (1..=5)
        .rev()
        .map(|n| fungible(&format!("dep-{}", n), n, 2, "1"))
        .collect();
    let source = Arc::new(StaticSource::new(batch));
    let router = Arc::new(RecordingRouter::default());
    let stop = CancellationToken::new();
    let (sys_err_tx, _sys_err_rx) = oneshot::channel();

    let handle = Listener::new(
        chain_config(),
        source,
        router.clone(),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(policy(5, PollMode::OneShot))
    .start();

    wait_until(|| router.len() == 5).await;
    stop.cancel();
    handle.await.unwrap();

    assert_eq!(router.nonces(), vec![5, 4, 3, 2, 1]);
    let first = &router.messages.lock().unwrap()[0];
    assert_eq!(first.source(), ChainId(1));
    assert_eq!(first.destination(), ChainId(2));
    assert_eq!(first.nonce(), Nonce(5));
}

// ============================================================================
// Poll modes
// ============================================================================

#[tokio::test]
async fn test_one_shot_mode_fetches_once() {
    let source = Arc::new(StaticSource::new(vec![fungible("a", 1, 2, "1")]));
    let router = Arc::new(RecordingRouter::default());
    let stop = CancellationToken::new();
    let (sys_err_tx, _sys_err_rx) = oneshot::channel();

    let handle = Listener::new(
        chain_config(),
        source.clone(),
        router.clone(),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(policy(5, PollMode::OneShot))
    .start();

    wait_until(|| router.len() == 1).await;
    // Several idle intervals pass without another fetch
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.cancel();
    handle.await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(router.len(), 1);
}

#[tokio::test]
async fn test_continuous_mode_does_not_redeliver() {
    let source = Arc::new(StaticSource::new(vec![
        fungible("a", 1, 2, "1"),
        fungible("b", 2, 2, "1"),
    ]));
    let router = Arc::new(RecordingRouter::default());
    let stop = CancellationToken::new();
    let (sys_err_tx, _sys_err_rx) = oneshot::channel();

    let handle = Listener::new(
        chain_config(),
        source.clone(),
        router.clone(),
        stop.clone(),
        sys_err_tx,
    )
    .with_policy(policy(5, PollMode::Continuous))
    .start();

    wait_until(|| source.calls.load(Ordering::SeqCst) >= 3).await;
    stop.cancel();
    assert_eq!(handle.await.unwrap(), PollOutcome::Terminated);

    assert_eq!(router.nonces(), vec![1, 2]);
}

#[tokio::test]
async fn test_idle_listener_reports_polling_state() {
    for mode in [PollMode::OneShot, PollMode::Continuous] {
        let source = Arc::new(StaticSource::new(Vec::new()));
        let stop = CancellationToken::new();
        let (sys_err_tx, _sys_err_rx) = oneshot::channel();

        let listener = Listener::new(
            chain_config(),
            source.clone(),
            Arc::new(RecordingRouter::default()),
            stop.clone(),
            sys_err_tx,
        )
        .with_policy(PollPolicy {
            idle_interval: Duration::from_secs(60),
            ..policy(5, mode)
        });
        let stats = listener.stats();
        let handle = listener.start();

        wait_until(|| stats.try_read().is_ok_and(|s| s.cycles == 1)).await;
        // Batch drained; the listener idles in the polling state
        wait_until(|| {
            stats
                .try_read()
                .is_ok_and(|s| s.state == ListenerState::Polling)
        })
        .await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1, "{:?}", mode);

        stop.cancel();
        assert_eq!(handle.await.unwrap(), PollOutcome::Terminated);
        assert_eq!(stats.read().await.state, ListenerState::Stopped);
    }
}
