//! Shared state behind every gateway handler.

use std::sync::Arc;

use paraprobe_common::{now_secs, Address};
use paraprobe_engine::{ActiveTests, Broadcaster, RequestPoller, TestRunner};

/// Everything a request handler can reach, assembled once at startup.
pub struct AppState {
    pub runner: Arc<TestRunner>,
    /// Present only when a request log address is configured.
    pub poller: Option<Arc<RequestPoller>>,
    pub registry: Arc<ActiveTests>,
    pub broadcaster: Arc<Broadcaster>,
    pub ledger_endpoint: String,
    pub authority_address: Address,
    /// Unix seconds at startup, for uptime reporting.
    pub started_at: u64,
}

impl AppState {
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        now_secs().saturating_sub(self.started_at)
    }

    /// Whether the request poller exists and its task is live.
    #[must_use]
    pub fn polling_active(&self) -> bool {
        self.poller.as_ref().map(|p| p.is_running()).unwrap_or(false)
    }
}
