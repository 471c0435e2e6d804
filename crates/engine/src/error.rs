//! Failure modes of a stress-test run.

use thiserror::Error;

use paraprobe_common::Address;

/// Why a run could not produce a [`paraprobe_common::TestResult`].
///
/// Everything here is terminal for the run that hit it and recoverable
/// for the service: the caller reports the failure and the service keeps
/// serving.
#[derive(Debug, Error)]
pub enum RunError {
    /// Every funding transfer failed, leaving no identity able to sign
    /// a call.
    #[error("no identities could be funded ({attempted} attempted)")]
    NoFundedIdentities { attempted: u32 },

    /// The requested target address carries no program code.
    #[error("target {0} has no program code")]
    TargetNotContract(Address),

    /// The caller handed over parameters no run can be built from.
    #[error("invalid run parameters: {0}")]
    InvalidParams(String),
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
