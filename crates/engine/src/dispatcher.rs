//! Concurrent burst dispatch against a target program.
//!
//! Every call becomes its own task so the burst truly lands in
//! parallel; identities are reused round-robin when the burst is larger
//! than the pool. Per-call latency is measured from submission to
//! confirmed receipt, which is the number the scoring cares about.

use std::sync::Arc;

use rand::RngCore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

use paraprobe_common::{Address, Hash32};
use paraprobe_ledger::{Identity, LedgerClient, ProbeCall};

// ════════════════════════════════════════════════════════════════════════════
// OUTCOMES AND PROGRESS
// ════════════════════════════════════════════════════════════════════════════

/// Resolution of one dispatched call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub success: bool,
    /// Submission-to-confirmation wall time.
    pub latency_ms: u64,
    /// Gas consumed; zero for failed calls.
    pub gas_used: u64,
    /// Transaction reference, when submission got that far.
    pub tx_ref: Option<Hash32>,
    pub error: Option<String>,
}

/// Running tally of a burst, emitted once per resolved call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstProgress {
    pub completed: u32,
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub last_latency_ms: u64,
}

/// Receives the tally as calls resolve. Implemented by the broadcaster;
/// tests plug in collectors.
pub trait BurstObserver: Send + Sync {
    fn on_progress(&self, progress: BurstProgress);
}

// ════════════════════════════════════════════════════════════════════════════
// DISPATCHER
// ════════════════════════════════════════════════════════════════════════════

/// Issues a burst of concurrent calls and collects their outcomes.
pub struct BurstDispatcher {
    ledger: Arc<dyn LedgerClient>,
    gas_limit: u64,
}

impl BurstDispatcher {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, gas_limit: u64) -> Self {
        BurstDispatcher { ledger, gas_limit }
    }

    /// Send `burst_size` calls to `function_name` on `target`, all at
    /// once, cycling through `identities` as senders.
    ///
    /// Resolves only after every call has a terminal outcome. A call
    /// that fails anywhere along the way becomes a failed outcome, never
    /// an early return. Outcomes arrive in completion order.
    pub async fn dispatch(
        &self,
        identities: &[Identity],
        target: Address,
        function_name: &str,
        burst_size: u32,
        observer: Option<&dyn BurstObserver>,
    ) -> Vec<CallOutcome> {
        if identities.is_empty() || burst_size == 0 {
            return Vec::new();
        }

        let mut task_set = JoinSet::new();
        for i in 0..burst_size {
            let identity = identities[i as usize % identities.len()].clone();
            let ledger = Arc::clone(&self.ledger);
            let call = ProbeCall {
                target,
                function_name: function_name.to_string(),
                tag: random_tag(),
                gas_limit: self.gas_limit,
            };
            task_set.spawn(async move { execute_call(ledger, &identity, call).await });
        }

        let total = burst_size;
        let mut outcomes = Vec::with_capacity(total as usize);
        let mut succeeded = 0u32;
        let mut failed = 0u32;
        while let Some(joined) = task_set.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => CallOutcome {
                    success: false,
                    latency_ms: 0,
                    gas_used: 0,
                    tx_ref: None,
                    error: Some(format!("call task failed to complete: {}", e)),
                },
            };
            if outcome.success {
                succeeded += 1;
            } else {
                failed += 1;
            }
            if let Some(observer) = observer {
                observer.on_progress(BurstProgress {
                    completed: succeeded + failed,
                    total,
                    succeeded,
                    failed,
                    last_latency_ms: outcome.latency_ms,
                });
            }
            outcomes.push(outcome);
        }
        debug!(
            "burst done: {} ok, {} failed of {}",
            succeeded, failed, total
        );
        outcomes
    }
}

/// Submit one call and wait out its receipt.
async fn execute_call(
    ledger: Arc<dyn LedgerClient>,
    identity: &Identity,
    call: ProbeCall,
) -> CallOutcome {
    let started = Instant::now();
    let tx_ref = match ledger.submit(identity.wallet(), &call).await {
        Ok(tx_ref) => tx_ref,
        Err(e) => {
            return CallOutcome {
                success: false,
                latency_ms: started.elapsed().as_millis() as u64,
                gas_used: 0,
                tx_ref: None,
                error: Some(e.to_string()),
            }
        }
    };

    match ledger.await_confirmation(tx_ref).await {
        Ok(confirmation) => {
            let latency_ms = started.elapsed().as_millis() as u64;
            if confirmation.is_ok() {
                CallOutcome {
                    success: true,
                    latency_ms,
                    gas_used: confirmation.gas_used,
                    tx_ref: Some(tx_ref),
                    error: None,
                }
            } else {
                CallOutcome {
                    success: false,
                    latency_ms,
                    gas_used: 0,
                    tx_ref: Some(tx_ref),
                    error: Some("execution reverted".to_string()),
                }
            }
        }
        Err(e) => CallOutcome {
            success: false,
            latency_ms: started.elapsed().as_millis() as u64,
            gas_used: 0,
            tx_ref: Some(tx_ref),
            error: Some(e.to_string()),
        },
    }
}

/// Fresh random tag so otherwise-identical calls stay distinct on the
/// wire.
fn random_tag() -> Hash32 {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Hash32::from_bytes(bytes)
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
