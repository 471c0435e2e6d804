//! End-to-end execution of one stress-test run.
//!
//! [`TestRunner::run`] is the single entry point for both trigger
//! paths, the HTTP handler and the on-chain request poller. It resolves
//! parameters against configured defaults and caps, provisions funded
//! identities, fires the burst and folds the outcomes into a scored
//! [`TestResult`].
//!
//! The runner announces starts and results to observers. Failures are
//! returned to the caller, which owns reporting them; that keeps every
//! error frame single-sourced.

use std::sync::Arc;

use tracing::info;

use paraprobe_common::config::TestConfig;
use paraprobe_common::{Address, RunParams, TestResult};
use paraprobe_ledger::{Identity, LedgerClient, Wallet};

use crate::broadcast::{Broadcaster, ObserverMessage};
use crate::dispatcher::{BurstDispatcher, BurstObserver};
use crate::error::RunError;
use crate::metrics;
use crate::pool::IdentityPool;

/// Parameters after defaults and caps have been applied.
struct ResolvedParams {
    target: Address,
    function_name: String,
    bot_count: u32,
    burst_size: u32,
    requester: Address,
}

/// Orchestrates provisioning, dispatch and aggregation for one run.
pub struct TestRunner {
    pool: IdentityPool,
    dispatcher: BurstDispatcher,
    authority: Wallet,
    broadcaster: Option<Arc<Broadcaster>>,
    config: TestConfig,
}

impl TestRunner {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        authority: Wallet,
        config: TestConfig,
        gas_limit: u64,
        broadcaster: Option<Arc<Broadcaster>>,
    ) -> Self {
        TestRunner {
            pool: IdentityPool::new(Arc::clone(&ledger), config.funding_delay_ms),
            dispatcher: BurstDispatcher::new(ledger, gas_limit),
            authority,
            broadcaster,
            config,
        }
    }

    /// Execute one run to completion.
    ///
    /// Unset counts fall back to the configured defaults; set counts are
    /// capped at the configured maxima. An unset requester is recorded
    /// as the authority itself, which is what a run triggered over HTTP
    /// amounts to.
    pub async fn run(&self, params: RunParams) -> Result<TestResult, RunError> {
        let resolved = self.resolve(params)?;
        info!(
            "starting test: target {} function {} bots {} burst {}",
            resolved.target, resolved.function_name, resolved.bot_count, resolved.burst_size
        );
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast(&ObserverMessage::TestStarted {
                target: resolved.target,
                function_name: resolved.function_name.clone(),
                bot_count: resolved.bot_count,
                burst_size: resolved.burst_size,
            });
        }

        let outcomes = self
            .pool
            .provision(resolved.bot_count, &self.authority, self.config.funding_amount)
            .await;
        let funded: Vec<Identity> = outcomes
            .into_iter()
            .filter(|o| o.funded)
            .map(|o| o.identity)
            .collect();
        if funded.is_empty() {
            return Err(RunError::NoFundedIdentities {
                attempted: resolved.bot_count,
            });
        }
        info!("{}/{} identities funded", funded.len(), resolved.bot_count);

        let observer = self
            .broadcaster
            .as_deref()
            .map(|broadcaster| broadcaster as &dyn BurstObserver);
        let call_outcomes = self
            .dispatcher
            .dispatch(
                &funded,
                resolved.target,
                &resolved.function_name,
                resolved.burst_size,
                observer,
            )
            .await;

        let result = metrics::aggregate(
            resolved.target,
            &resolved.function_name,
            resolved.requester,
            &call_outcomes,
        );
        info!(
            "test complete: {} sent, {} ok, {} failed, score {}",
            result.sent, result.succeeded, result.failed, result.parallel_score
        );
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast(&ObserverMessage::Result {
                result: result.clone(),
            });
        }
        Ok(result)
    }

    fn resolve(&self, params: RunParams) -> Result<ResolvedParams, RunError> {
        let function_name = params.function_name.trim().to_string();
        if function_name.is_empty() {
            return Err(RunError::InvalidParams(
                "function name is empty".to_string(),
            ));
        }
        if params.bot_count == Some(0) {
            return Err(RunError::InvalidParams(
                "bot count must be positive".to_string(),
            ));
        }
        if params.burst_size == Some(0) {
            return Err(RunError::InvalidParams(
                "burst size must be positive".to_string(),
            ));
        }

        Ok(ResolvedParams {
            target: params.target,
            function_name,
            bot_count: params
                .bot_count
                .unwrap_or(self.config.default_bot_count)
                .min(self.config.max_bot_count),
            burst_size: params
                .burst_size
                .unwrap_or(self.config.default_burst_size)
                .min(self.config.max_burst_size),
            requester: params
                .requester
                .unwrap_or_else(|| self.authority.address()),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
