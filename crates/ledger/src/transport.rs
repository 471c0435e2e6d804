//! Ledger RPC boundary.
//!
//! [`LedgerClient`] abstracts everything the engine needs from the ledger
//! network: submitting calls, awaiting receipts, moving funds, reading
//! heights and code, querying the request log, and writing results back.
//! The real network lives behind [`crate::HttpLedger`]; tests script
//! [`crate::MockLedger`] instead.
//!
//! Every method returns a recoverable error. Call sites treat a failure
//! as a per-item outcome (a failed call, an unfunded identity, a skipped
//! polling tick), never as a reason to abort a whole run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use paraprobe_common::{Address, BlockHeight, Hash32, TestRequest, TestResult};

use crate::wallet::Wallet;

// ════════════════════════════════════════════════════════════════════════════
// WIRE TYPES
// ════════════════════════════════════════════════════════════════════════════

/// One state-changing call dispatched during a burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeCall {
    /// Target program address.
    pub target: Address,
    /// Function selector on the target program.
    pub function_name: String,
    /// Random per-call tag; keeps otherwise-identical calls distinct on
    /// the wire, carries no meaning.
    pub tag: Hash32,
    pub gas_limit: u64,
}

/// Terminal execution status reported by a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ok,
    Reverted,
}

/// Finalized outcome of one submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub status: CallStatus,
    pub gas_used: u64,
}

impl Confirmation {
    /// A successful confirmation consuming `gas_used`.
    #[must_use]
    pub fn ok(gas_used: u64) -> Self {
        Confirmation {
            status: CallStatus::Ok,
            gas_used,
        }
    }

    /// A reverted execution. Gas still metered by real ledgers; tests can
    /// leave it zero.
    #[must_use]
    pub fn reverted(gas_used: u64) -> Self {
        Confirmation {
            status: CallStatus::Reverted,
            gas_used,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == CallStatus::Ok
    }
}

// ════════════════════════════════════════════════════════════════════════════
// CLIENT TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Async client boundary to the ledger network.
///
/// Object-safe and `Send + Sync` so one shared client instance can serve
/// every concurrent burst task.
///
/// Implementations must not retry internally; bounded retry belongs to
/// the orchestration layer.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a state-changing call signed by `sender`; returns the
    /// transaction reference.
    async fn submit(&self, sender: &Wallet, call: &ProbeCall) -> anyhow::Result<Hash32>;

    /// Wait until the referenced transaction reaches a terminal status.
    async fn await_confirmation(&self, tx_ref: Hash32) -> anyhow::Result<Confirmation>;

    /// Transfer `amount` base units from `from` to `to`; returns the
    /// transaction reference.
    async fn transfer(&self, from: &Wallet, to: Address, amount: u128) -> anyhow::Result<Hash32>;

    /// Current chain height.
    async fn height(&self) -> anyhow::Result<BlockHeight>;

    /// Deployed code at `address`; empty for accounts without a program.
    async fn code_at(&self, address: Address) -> anyhow::Result<Vec<u8>>;

    /// Test requests recorded by the request log over the inclusive
    /// height range `[from, to]`.
    async fn query_requests(
        &self,
        log_address: Address,
        from: BlockHeight,
        to: BlockHeight,
    ) -> anyhow::Result<Vec<TestRequest>>;

    /// Write a completed result record under `test_id`, signed by the
    /// service authority; returns the transaction reference.
    async fn store_result(
        &self,
        authority: &Wallet,
        log_address: Address,
        test_id: Hash32,
        result: &TestResult,
    ) -> anyhow::Result<Hash32>;
}

// ════════════════════════════════════════════════════════════════════════════
// COMPILE-TIME ASSERTIONS
// ════════════════════════════════════════════════════════════════════════════

const _: () = {
    fn assert_send_sync<T: Send + Sync + ?Sized>() {}
    fn check() {
        assert_send_sync::<dyn LedgerClient>();
    }
    let _ = check;
};

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
