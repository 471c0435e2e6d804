//! Aggregation of raw call outcomes into a scored result.
//!
//! Pure functions only. The dispatcher hands over one
//! [`CallOutcome`](crate::dispatcher::CallOutcome) per call; this module
//! folds them into the [`TestResult`] record that gets broadcast and
//! stored on chain.

use chrono::Utc;

use paraprobe_common::{now_millis, Address, TestResult};

use crate::dispatcher::CallOutcome;

// ════════════════════════════════════════════════════════════════════════════
// PERCENTILES
// ════════════════════════════════════════════════════════════════════════════

/// 95th-percentile latency of `samples`, in the samples' own unit.
///
/// Uses the nearest-rank method: the value at index `ceil(0.95 * n) - 1`
/// of the ascending sort, clamped into range. Empty input yields zero.
#[must_use]
pub fn percentile95(samples: &[u64]) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let rank = (0.95 * n as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(n - 1)]
}

// ════════════════════════════════════════════════════════════════════════════
// SCORING
// ════════════════════════════════════════════════════════════════════════════

/// Composite 0..=100 score for how well a target took the burst.
///
/// Weighted blend of three components: the success rate (40%), an
/// inverted latency component `100 - avg_latency_ms / 50` (30%) and an
/// inverted gas component `100 - avg_gas / 1000` (30%), each clamped to
/// 0..=100 before weighting. A perfect run scores 100; a run that fails
/// everything at 10s latencies scores 0.
#[must_use]
pub fn parallel_score(success_rate_pct: u32, avg_latency_ms: f64, avg_gas: f64) -> u32 {
    let latency_component = (100.0 - avg_latency_ms / 50.0).clamp(0.0, 100.0);
    let gas_component = (100.0 - avg_gas / 1000.0).clamp(0.0, 100.0);
    let score =
        f64::from(success_rate_pct) * 0.4 + latency_component * 0.3 + gas_component * 0.3;
    score.round() as u32
}

// ════════════════════════════════════════════════════════════════════════════
// AGGREGATION
// ════════════════════════════════════════════════════════════════════════════

/// Fold the outcomes of one burst into a [`TestResult`].
///
/// Latency averages over every call; gas averages over successful calls
/// only and is zero when nothing succeeded. The completion timestamp is
/// taken here, once, so the stored record and the broadcast record agree.
#[must_use]
pub fn aggregate(
    target: Address,
    function_name: &str,
    requester: Address,
    outcomes: &[CallOutcome],
) -> TestResult {
    let sent = outcomes.len() as u32;
    let succeeded = outcomes.iter().filter(|o| o.success).count() as u32;
    let failed = sent - succeeded;

    let latencies: Vec<u64> = outcomes.iter().map(|o| o.latency_ms).collect();
    let avg_latency_ms = if sent == 0 {
        0.0
    } else {
        latencies.iter().sum::<u64>() as f64 / f64::from(sent)
    };

    let avg_gas = if succeeded == 0 {
        0.0
    } else {
        let total: u64 = outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.gas_used)
            .sum();
        total as f64 / f64::from(succeeded)
    };

    let success_rate_pct = if sent == 0 {
        0
    } else {
        (100.0 * f64::from(succeeded) / f64::from(sent)).round() as u32
    };

    TestResult {
        target,
        function_name: function_name.to_string(),
        sent,
        succeeded,
        failed,
        avg_latency_ms,
        p95_latency_ms: percentile95(&latencies),
        avg_gas,
        success_rate_pct,
        parallel_score: parallel_score(success_rate_pct, avg_latency_ms, avg_gas),
        timestamp_ms: now_millis(),
        completed_at: Utc::now().to_rfc3339(),
        requester,
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
