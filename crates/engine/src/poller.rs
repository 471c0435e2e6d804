//! Background poller for on-chain test requests.
//!
//! Requesters register tests through the request-log program on chain;
//! this poller discovers those requests by querying the log over a
//! bounded window of recent heights, launches a run for each new one
//! and writes the scored result back to the chain under a derived test
//! id.
//!
//! The loop is deliberately hard to kill: a failed cycle is logged and
//! the next cycle starts from the same cursor, so transient ledger
//! trouble costs coverage of nothing but time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sha3::{Digest, Keccak256};
use tokio::sync::Notify;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, error, info, warn};

use paraprobe_common::config::PollerConfig;
use paraprobe_common::{now_millis, Address, BlockHeight, Hash32, RunParams, TestRequest, TestResult};
use paraprobe_ledger::{LedgerClient, Wallet};

use crate::broadcast::{Broadcaster, ObserverMessage};
use crate::error::RunError;
use crate::registry::{ActiveTest, ActiveTests};
use crate::runner::TestRunner;

/// Widest height range a single query may cover. Keeps a poller that
/// fell behind from asking the ledger for an unbounded scan.
const QUERY_WINDOW: u64 = 10;

/// Pause between result-storage attempts (milliseconds).
const STORE_RETRY_DELAY_MS: u64 = 500;

/// Polls the request log and executes what it finds.
pub struct RequestPoller {
    ledger: Arc<dyn LedgerClient>,
    runner: Arc<TestRunner>,
    registry: Arc<ActiveTests>,
    broadcaster: Arc<Broadcaster>,
    /// Signs result-storage transactions.
    authority: Wallet,
    /// Address of the on-chain request log.
    log_address: Address,
    interval_ms: u64,
    store_attempts: u32,
    /// Highest height already queried; `None` until the baseline tick.
    last_processed: Mutex<Option<BlockHeight>>,
    /// Flag to track if the polling task is running.
    running: AtomicBool,
    /// Notify for shutdown coordination.
    shutdown_notify: Arc<Notify>,
}

impl RequestPoller {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        runner: Arc<TestRunner>,
        registry: Arc<ActiveTests>,
        broadcaster: Arc<Broadcaster>,
        authority: Wallet,
        log_address: Address,
        config: &PollerConfig,
    ) -> Self {
        RequestPoller {
            ledger,
            runner,
            registry,
            broadcaster,
            authority,
            log_address,
            interval_ms: config.interval_ms,
            store_attempts: config.store_attempts,
            last_processed: Mutex::new(None),
            running: AtomicBool::new(false),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Start the polling task. Returns `false` if it is already running;
    /// a second task is never spawned.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let poller = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown_notify);
        let period = Duration::from_millis(self.interval_ms);

        tokio::spawn(async move {
            info!(
                "request poller started: log {} every {}ms",
                poller.log_address, poller.interval_ms
            );
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = Arc::clone(&poller).tick().await {
                            warn!("poll cycle failed: {}", e);
                        }
                    }
                    _ = shutdown.notified() => {
                        poller.running.store(false, Ordering::SeqCst);
                        info!("request poller stopped");
                        break;
                    }
                }
            }
        });

        true
    }

    /// Signal the polling task to exit. In-flight test executions are
    /// not interrupted; they finish and clean up after themselves.
    pub fn stop(&self) {
        if self.running.load(Ordering::SeqCst) {
            self.shutdown_notify.notify_one();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Polling cycle ───────────────────────────────────────────────────────

    /// One cycle: read the height, query the window of new heights,
    /// launch every request not already in flight.
    async fn tick(self: Arc<Self>) -> anyhow::Result<()> {
        let current = self.ledger.height().await?;

        let from = {
            let mut last = self.last_processed.lock();
            match *last {
                None => {
                    // First cycle after a start: everything older than
                    // this is history and must not be replayed.
                    *last = Some(current);
                    debug!("poll baseline recorded at height {}", current);
                    return Ok(());
                }
                Some(last_height) if current <= last_height => return Ok(()),
                Some(last_height) => {
                    let floor = current.saturating_sub(QUERY_WINDOW - 1);
                    let from = (last_height + 1).max(floor);
                    if from > last_height + 1 {
                        warn!(
                            "poller fell behind: heights {}..={} skipped",
                            last_height + 1,
                            from - 1
                        );
                    }
                    from
                }
            }
        };

        let requests = self
            .ledger
            .query_requests(self.log_address, from, current)
            .await?;
        // The cursor only advances past heights that were actually
        // queried; a failed query retries the same window next cycle.
        *self.last_processed.lock() = Some(current);

        if !requests.is_empty() {
            debug!(
                "{} request(s) found in heights {}..={}",
                requests.len(),
                from,
                current
            );
        }

        for request in requests {
            let entry = ActiveTest {
                request_id: request.request_id,
                requester: request.requester,
                target: request.target,
                function_name: request.function_name.clone(),
                tx_count: request.tx_count,
                started_at_ms: now_millis(),
            };
            if !self.registry.insert_if_absent(entry) {
                debug!("request {} already in flight, skipped", request.request_id);
                continue;
            }
            info!(
                "request {}: {} calls to {} on {}",
                request.request_id, request.tx_count, request.function_name, request.target
            );
            let poller = Arc::clone(&self);
            tokio::spawn(async move { poller.execute(request).await });
        }

        Ok(())
    }

    // ── Request execution ───────────────────────────────────────────────────

    /// Run one discovered request to its end. The registry entry goes
    /// away whatever happens; a failure is reported to observers, never
    /// propagated.
    async fn execute(&self, request: TestRequest) {
        let request_id = request.request_id;
        if let Err(e) = self.run_requested(&request).await {
            warn!("requested test {} failed: {}", request_id, e);
            self.broadcaster.broadcast(&ObserverMessage::error(format!(
                "requested test {} failed: {}",
                request_id, e
            )));
        }
        self.registry.remove(request_id);
    }

    async fn run_requested(&self, request: &TestRequest) -> anyhow::Result<()> {
        // A request naming an address without code would burn a whole
        // provisioning cycle for nothing; reject it up front.
        let code = self.ledger.code_at(request.target).await?;
        if code.is_empty() {
            return Err(RunError::TargetNotContract(request.target).into());
        }

        let params = RunParams {
            target: request.target,
            function_name: request.function_name.clone(),
            bot_count: Some(request.tx_count),
            burst_size: Some(request.tx_count),
            requester: Some(request.requester),
        };
        let result = self.runner.run(params).await?;

        let test_id = derive_test_id(request.request_id, request.requester, result.timestamp_ms);
        self.store_with_retry(test_id, &result).await;
        Ok(())
    }

    // ── Result storage ──────────────────────────────────────────────────────

    /// Write the result on chain, retrying a bounded number of times.
    /// Exhausting the attempts loses the stored record but nothing
    /// else; the result was already broadcast.
    async fn store_with_retry(&self, test_id: Hash32, result: &TestResult) {
        for attempt in 1..=self.store_attempts {
            match self.try_store(test_id, result).await {
                Ok(tx_ref) => {
                    info!("result {} stored on chain in tx {}", test_id, tx_ref);
                    return;
                }
                Err(e) => {
                    warn!(
                        "storing result {} failed (attempt {}/{}): {}",
                        test_id, attempt, self.store_attempts, e
                    );
                    if attempt < self.store_attempts {
                        sleep(Duration::from_millis(STORE_RETRY_DELAY_MS)).await;
                    }
                }
            }
        }
        error!(
            "result {} lost after {} storage attempts",
            test_id, self.store_attempts
        );
    }

    async fn try_store(&self, test_id: Hash32, result: &TestResult) -> anyhow::Result<Hash32> {
        let tx_ref = self
            .ledger
            .store_result(&self.authority, self.log_address, test_id, result)
            .await?;
        let confirmation = self.ledger.await_confirmation(tx_ref).await?;
        if !confirmation.is_ok() {
            anyhow::bail!("result storage reverted");
        }
        Ok(tx_ref)
    }
}

/// Identifier a stored result is filed under: a Keccak-256 digest
/// binding the request, its requester and the completion time.
fn derive_test_id(request_id: Hash32, requester: Address, completed_at_ms: u64) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(request_id.as_bytes());
    hasher.update(requester.as_bytes());
    hasher.update(completed_at_ms.to_be_bytes());
    Hash32::from_bytes(hasher.finalize().into())
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use paraprobe_common::config::TestConfig;
    use paraprobe_ledger::{Confirmation, MockLedger};

    fn poller_with_delay(mock: &Arc<MockLedger>, funding_delay_ms: u64) -> Arc<RequestPoller> {
        let broadcaster = Arc::new(Broadcaster::new(30_000));
        let runner = Arc::new(TestRunner::new(
            Arc::clone(mock) as Arc<dyn LedgerClient>,
            Wallet::generate(),
            TestConfig {
                default_bot_count: 2,
                default_burst_size: 2,
                max_bot_count: 4,
                max_burst_size: 4,
                funding_amount: 1_000,
                funding_delay_ms,
            },
            100_000,
            Some(Arc::clone(&broadcaster)),
        ));
        Arc::new(RequestPoller::new(
            Arc::clone(mock) as Arc<dyn LedgerClient>,
            runner,
            Arc::new(ActiveTests::new()),
            broadcaster,
            Wallet::generate(),
            Address::from_bytes([0xee; 20]),
            &PollerConfig {
                interval_ms: 3_000,
                store_attempts: 3,
            },
        ))
    }

    fn poller_over(mock: &Arc<MockLedger>) -> Arc<RequestPoller> {
        poller_with_delay(mock, 0)
    }

    // ── Test id derivation ──────────────────────────────────────────────────

    #[test]
    fn test_derive_test_id_deterministic() {
        let request_id = Hash32::from_bytes([1u8; 32]);
        let requester = Address::from_bytes([2u8; 20]);
        assert_eq!(
            derive_test_id(request_id, requester, 1_000),
            derive_test_id(request_id, requester, 1_000)
        );
    }

    #[test]
    fn test_derive_test_id_binds_every_input() {
        let request_id = Hash32::from_bytes([1u8; 32]);
        let requester = Address::from_bytes([2u8; 20]);
        let base = derive_test_id(request_id, requester, 1_000);

        assert_ne!(
            base,
            derive_test_id(Hash32::from_bytes([9u8; 32]), requester, 1_000)
        );
        assert_ne!(
            base,
            derive_test_id(request_id, Address::from_bytes([9u8; 20]), 1_000)
        );
        assert_ne!(base, derive_test_id(request_id, requester, 1_001));
    }

    // ── Cursor and window ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_first_cycle_only_records_baseline() {
        let mock = Arc::new(MockLedger::default());
        mock.push_height(100);
        let poller = poller_over(&mock);

        Arc::clone(&poller).tick().await.unwrap();

        assert!(mock.queried_windows().is_empty());
        assert_eq!(*poller.last_processed.lock(), Some(100));
    }

    #[tokio::test]
    async fn test_unchanged_height_skips_query() {
        let mock = Arc::new(MockLedger::default());
        mock.push_height(100);
        mock.push_height(100);
        let poller = poller_over(&mock);

        Arc::clone(&poller).tick().await.unwrap();
        Arc::clone(&poller).tick().await.unwrap();

        assert!(mock.queried_windows().is_empty());
    }

    #[tokio::test]
    async fn test_window_covers_new_heights_only() {
        let mock = Arc::new(MockLedger::default());
        mock.push_height(100);
        mock.push_height(103);
        mock.push_requests(Vec::new());
        let poller = poller_over(&mock);

        Arc::clone(&poller).tick().await.unwrap();
        Arc::clone(&poller).tick().await.unwrap();

        assert_eq!(mock.queried_windows(), vec![(101, 103)]);
    }

    #[tokio::test]
    async fn test_window_clamped_after_long_gap() {
        let mock = Arc::new(MockLedger::default());
        mock.push_height(100);
        mock.push_height(150);
        mock.push_requests(Vec::new());
        let poller = poller_over(&mock);

        Arc::clone(&poller).tick().await.unwrap();
        Arc::clone(&poller).tick().await.unwrap();

        // Ten heights at most: 141..=150, the rest skipped.
        assert_eq!(mock.queried_windows(), vec![(141, 150)]);
    }

    #[tokio::test]
    async fn test_failed_query_does_not_advance_cursor() {
        let mock = Arc::new(MockLedger::default());
        mock.push_height(100);
        mock.push_height(105);
        mock.fail_requests("log unavailable");
        mock.push_height(106);
        mock.push_requests(Vec::new());
        let poller = poller_over(&mock);

        Arc::clone(&poller).tick().await.unwrap();
        assert!(Arc::clone(&poller).tick().await.is_err());
        Arc::clone(&poller).tick().await.unwrap();

        // The failed window's heights come back in the retry.
        assert_eq!(mock.queried_windows(), vec![(101, 105), (101, 106)]);
    }

    // ── Dedup ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_request_rediscovered_while_running_is_skipped() {
        let mock = Arc::new(MockLedger::default());
        let request = TestRequest {
            request_id: Hash32::from_bytes([7u8; 32]),
            requester: Address::from_bytes([1u8; 20]),
            target: Address::from_bytes([2u8; 20]),
            function_name: "ping".to_string(),
            tx_count: 2,
            timestamp: 1_700_000_000,
        };
        mock.push_height(100);
        mock.push_height(101);
        mock.push_height(102);
        mock.push_requests(vec![request.clone()]);
        mock.push_requests(vec![request]);
        mock.push_code(vec![0x60]);
        for i in 0..2u8 {
            mock.push_transfer(Hash32::from_bytes([0x10 + i; 32]));
            mock.push_confirmation(Confirmation::ok(21_000));
        }
        for i in 0..2u8 {
            mock.push_submit(Hash32::from_bytes([0x40 + i; 32]));
            mock.push_confirmation(Confirmation::ok(30_000));
        }
        mock.push_store(Hash32::from_bytes([0x99; 32]));
        mock.push_confirmation(Confirmation::ok(21_000));

        // Slow provisioning keeps the first run in flight across the
        // third cycle.
        let poller = poller_with_delay(&mock, 200);
        Arc::clone(&poller).tick().await.unwrap();
        Arc::clone(&poller).tick().await.unwrap();
        Arc::clone(&poller).tick().await.unwrap();

        for _ in 0..300 {
            if !mock.stored_results().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(mock.stored_results().len(), 1);
        assert_eq!(mock.submitted_calls().len(), 2);
        assert_eq!(mock.queried_windows(), vec![(101, 101), (102, 102)]);
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let mock = Arc::new(MockLedger::default());
        mock.push_height(100);
        let poller = poller_over(&mock);

        assert!(!poller.is_running());
        assert!(poller.start());
        assert!(poller.is_running());
        assert!(!poller.start());

        poller.stop();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!poller.is_running());
        // Stopping an already stopped poller is a no-op.
        poller.stop();
        assert!(!poller.is_running());
    }
}
