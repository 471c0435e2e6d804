//! Registry of currently executing on-chain test requests.
//!
//! The poller inserts before launching a run and removes when the run
//! finishes, succeed or fail. Insertion doubles as the dedup gate: a
//! request id the chain reports twice (overlapping query windows, slow
//! runs spanning several ticks) only ever launches once.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

use paraprobe_common::{now_millis, Address, Hash32};

/// Metadata held while a requested test executes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveTest {
    pub request_id: Hash32,
    pub requester: Address,
    pub target: Address,
    pub function_name: String,
    pub tx_count: u32,
    pub started_at_ms: u64,
}

/// One registry entry as reported over the HTTP surface, with the
/// elapsed wall time computed at snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveTestSnapshot {
    pub request_id: Hash32,
    pub requester: Address,
    pub target: Address,
    pub function_name: String,
    pub tx_count: u32,
    pub started_at_ms: u64,
    pub duration_ms: u64,
}

/// Shared map of in-flight requested tests, keyed by request id.
#[derive(Debug, Default)]
pub struct ActiveTests {
    inner: Mutex<HashMap<Hash32, ActiveTest>>,
}

impl ActiveTests {
    #[must_use]
    pub fn new() -> Self {
        ActiveTests::default()
    }

    /// Track `test` unless its request id is already present. Returns
    /// whether the entry was inserted; `false` means a run for this
    /// request is still executing and the caller must not start another.
    pub fn insert_if_absent(&self, test: ActiveTest) -> bool {
        let mut inner = self.inner.lock();
        if inner.contains_key(&test.request_id) {
            return false;
        }
        inner.insert(test.request_id, test);
        true
    }

    /// Drop the entry for `request_id`, returning it if it was tracked.
    pub fn remove(&self, request_id: Hash32) -> Option<ActiveTest> {
        self.inner.lock().remove(&request_id)
    }

    #[must_use]
    pub fn contains(&self, request_id: Hash32) -> bool {
        self.inner.lock().contains_key(&request_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Every tracked entry with its elapsed time, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActiveTestSnapshot> {
        let now = now_millis();
        let mut entries: Vec<ActiveTestSnapshot> = self
            .inner
            .lock()
            .values()
            .map(|test| ActiveTestSnapshot {
                request_id: test.request_id,
                requester: test.requester,
                target: test.target,
                function_name: test.function_name.clone(),
                tx_count: test.tx_count,
                started_at_ms: test.started_at_ms,
                duration_ms: now.saturating_sub(test.started_at_ms),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.started_at_ms
                .cmp(&b.started_at_ms)
                .then(a.request_id.cmp(&b.request_id))
        });
        entries
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
