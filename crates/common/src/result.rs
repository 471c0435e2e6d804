//! Shared test request / result DTOs.
//!
//! These cross every boundary in the workspace: the ledger client decodes
//! `TestRequest` from on-chain events, the engine produces `TestResult`,
//! and the gateway serializes both to API and observer clients.

use serde::{Deserialize, Serialize};

use crate::types::{Address, Hash32};

/// A stress-test request read from the on-chain request log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRequest {
    pub request_id: Hash32,
    pub requester: Address,
    /// Program under test.
    pub target: Address,
    pub function_name: String,
    /// Requested burst size; zero means "use the service default".
    pub tx_count: u32,
    /// Ledger timestamp of the request, in seconds.
    pub timestamp: u64,
}

/// Parameters for one test run, before defaults and caps are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub target: Address,
    pub function_name: String,
    pub bot_count: Option<u32>,
    pub burst_size: Option<u32>,
    /// Recorded in the result; defaults to the service authority.
    pub requester: Option<Address>,
}

/// Aggregated outcome of one completed burst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub target: Address,
    pub function_name: String,
    pub sent: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Mean latency across every call, successful or not.
    pub avg_latency_ms: f64,
    pub p95_latency_ms: u64,
    /// Mean gas across successful calls only; zero when none succeeded.
    pub avg_gas: f64,
    pub success_rate_pct: u32,
    /// Composite 0..=100 parallel-execution score.
    pub parallel_score: u32,
    pub timestamp_ms: u64,
    /// RFC 3339 completion time, for human-facing consumers.
    pub completed_at: String,
    pub requester: Address,
}
