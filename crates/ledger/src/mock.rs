//! Scripted ledger test double.
//!
//! [`MockLedger`] answers each [`LedgerClient`] method from its own FIFO
//! queue of pre-loaded responses (first pushed, first returned) and
//! records every mutating call for assertions. An exhausted queue yields
//! a "no scripted response" error, which makes a test that consumes more
//! responses than it scripted fail loudly instead of hanging.

use parking_lot::Mutex;

use async_trait::async_trait;

use paraprobe_common::{Address, BlockHeight, Hash32, TestRequest, TestResult};

use crate::transport::{Confirmation, LedgerClient, ProbeCall};
use crate::wallet::Wallet;

// ════════════════════════════════════════════════════════════════════════════
// SCRIPTED QUEUES
// ════════════════════════════════════════════════════════════════════════════

/// FIFO of scripted outcomes; `Err(message)` scripts a transport failure.
type Scripted<T> = Mutex<Vec<Result<T, String>>>;

fn take<T>(queue: &Scripted<T>, method: &str) -> anyhow::Result<T> {
    let mut queue = queue.lock();
    if queue.is_empty() {
        anyhow::bail!("no scripted response for {}", method);
    }
    // FIFO: consume from the front
    match queue.remove(0) {
        Ok(value) => Ok(value),
        Err(message) => Err(anyhow::anyhow!(message)),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// MOCK LEDGER
// ════════════════════════════════════════════════════════════════════════════

/// In-memory [`LedgerClient`] with per-method response scripts and call
/// recording.
#[derive(Default)]
pub struct MockLedger {
    submits: Scripted<Hash32>,
    confirmations: Scripted<Confirmation>,
    transfers: Scripted<Hash32>,
    heights: Scripted<BlockHeight>,
    codes: Scripted<Vec<u8>>,
    request_batches: Scripted<Vec<TestRequest>>,
    stores: Scripted<Hash32>,

    recorded_submits: Mutex<Vec<(Address, ProbeCall)>>,
    recorded_transfers: Mutex<Vec<(Address, Address, u128)>>,
    recorded_queries: Mutex<Vec<(BlockHeight, BlockHeight)>>,
    recorded_stores: Mutex<Vec<(Hash32, TestResult)>>,
}

impl MockLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Scripting ────────────────────────────────────────────────────────

    pub fn push_submit(&self, tx_ref: Hash32) {
        self.submits.lock().push(Ok(tx_ref));
    }

    pub fn fail_submit(&self, error: &str) {
        self.submits.lock().push(Err(error.to_string()));
    }

    pub fn push_confirmation(&self, confirmation: Confirmation) {
        self.confirmations.lock().push(Ok(confirmation));
    }

    pub fn fail_confirmation(&self, error: &str) {
        self.confirmations.lock().push(Err(error.to_string()));
    }

    pub fn push_transfer(&self, tx_ref: Hash32) {
        self.transfers.lock().push(Ok(tx_ref));
    }

    pub fn fail_transfer(&self, error: &str) {
        self.transfers.lock().push(Err(error.to_string()));
    }

    pub fn push_height(&self, height: BlockHeight) {
        self.heights.lock().push(Ok(height));
    }

    pub fn fail_height(&self, error: &str) {
        self.heights.lock().push(Err(error.to_string()));
    }

    pub fn push_code(&self, code: Vec<u8>) {
        self.codes.lock().push(Ok(code));
    }

    pub fn fail_code(&self, error: &str) {
        self.codes.lock().push(Err(error.to_string()));
    }

    pub fn push_requests(&self, batch: Vec<TestRequest>) {
        self.request_batches.lock().push(Ok(batch));
    }

    pub fn fail_requests(&self, error: &str) {
        self.request_batches.lock().push(Err(error.to_string()));
    }

    pub fn push_store(&self, tx_ref: Hash32) {
        self.stores.lock().push(Ok(tx_ref));
    }

    pub fn fail_store(&self, error: &str) {
        self.stores.lock().push(Err(error.to_string()));
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// Sender address and call of every `submit`, in call order.
    #[must_use]
    pub fn submitted_calls(&self) -> Vec<(Address, ProbeCall)> {
        self.recorded_submits.lock().clone()
    }

    /// `(from, to, amount)` of every `transfer`, in call order.
    #[must_use]
    pub fn transfers_made(&self) -> Vec<(Address, Address, u128)> {
        self.recorded_transfers.lock().clone()
    }

    /// `(from, to)` height window of every `query_requests`.
    #[must_use]
    pub fn queried_windows(&self) -> Vec<(BlockHeight, BlockHeight)> {
        self.recorded_queries.lock().clone()
    }

    /// Test id and result of every `store_result`.
    #[must_use]
    pub fn stored_results(&self) -> Vec<(Hash32, TestResult)> {
        self.recorded_stores.lock().clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit(&self, sender: &Wallet, call: &ProbeCall) -> anyhow::Result<Hash32> {
        self.recorded_submits
            .lock()
            .push((sender.address(), call.clone()));
        take(&self.submits, "submit")
    }

    async fn await_confirmation(&self, _tx_ref: Hash32) -> anyhow::Result<Confirmation> {
        take(&self.confirmations, "await_confirmation")
    }

    async fn transfer(&self, from: &Wallet, to: Address, amount: u128) -> anyhow::Result<Hash32> {
        self.recorded_transfers
            .lock()
            .push((from.address(), to, amount));
        take(&self.transfers, "transfer")
    }

    async fn height(&self) -> anyhow::Result<BlockHeight> {
        take(&self.heights, "height")
    }

    async fn code_at(&self, _address: Address) -> anyhow::Result<Vec<u8>> {
        take(&self.codes, "code_at")
    }

    async fn query_requests(
        &self,
        _log_address: Address,
        from: BlockHeight,
        to: BlockHeight,
    ) -> anyhow::Result<Vec<TestRequest>> {
        self.recorded_queries.lock().push((from, to));
        take(&self.request_batches, "query_requests")
    }

    async fn store_result(
        &self,
        _authority: &Wallet,
        _log_address: Address,
        test_id: Hash32,
        result: &TestResult,
    ) -> anyhow::Result<Hash32> {
        self.recorded_stores.lock().push((test_id, result.clone()));
        take(&self.stores, "store_result")
    }
}

// ════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<MockLedger>();
    }
    let _ = check;
};

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
