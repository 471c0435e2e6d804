//! # Paraprobe Engine Crate
//!
//! Orchestration core of the paraprobe service: everything between a
//! trigger (HTTP call or on-chain request) and a scored, broadcast,
//! stored test result.
//!
//! ## Modules
//! - `runner`: end-to-end execution of one run
//! - `pool`: provisioning of funded sender identities
//! - `dispatcher`: concurrent burst dispatch and per-call outcomes
//! - `metrics`: percentile, scoring and result aggregation
//! - `poller`: background discovery of on-chain test requests
//! - `registry`: in-flight request tracking and dedup
//! - `broadcast`: observer fan-out and heartbeat
//! - `error`: run failure modes
//!
//! ## Usage
//! ```rust,ignore
//! let runner = Arc::new(TestRunner::new(ledger, authority, config.test, gas_limit, Some(broadcaster)));
//! let result = runner.run(params).await?;
//! ```

pub mod broadcast;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod pool;
pub mod registry;
pub mod runner;

pub use broadcast::{Broadcaster, ObserverMessage};
pub use dispatcher::{BurstDispatcher, BurstObserver, BurstProgress, CallOutcome};
pub use error::RunError;
pub use poller::RequestPoller;
pub use pool::{FundingOutcome, IdentityPool};
pub use registry::{ActiveTest, ActiveTestSnapshot, ActiveTests};
pub use runner::TestRunner;
