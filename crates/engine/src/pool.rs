//! Provisioning of funded throwaway identities.
//!
//! Each run gets a fresh set of [`Identity`] keypairs so calls land from
//! distinct senders. Funding is deliberately sequential: the transfers
//! all spend from the single authority account, and spacing them out
//! keeps its nonce handling trivial on every ledger backend.

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use paraprobe_ledger::{Identity, LedgerClient, Wallet};

/// Outcome of generating and funding one identity.
#[derive(Debug, Clone)]
pub struct FundingOutcome {
    pub identity: Identity,
    pub funded: bool,
    /// Why funding failed, when it did.
    pub error: Option<String>,
}

/// Builds the set of funded sender identities for a run.
pub struct IdentityPool {
    ledger: Arc<dyn LedgerClient>,
    funding_delay: Duration,
}

impl IdentityPool {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, funding_delay_ms: u64) -> Self {
        IdentityPool {
            ledger,
            funding_delay: Duration::from_millis(funding_delay_ms),
        }
    }

    /// Generate `count` fresh identities and fund each with `amount`
    /// base units from `funder`, one transfer at a time.
    ///
    /// A failed transfer marks that identity unfunded and moves on; the
    /// returned outcomes keep generation order, one per requested
    /// identity.
    pub async fn provision(
        &self,
        count: u32,
        funder: &Wallet,
        amount: u128,
    ) -> Vec<FundingOutcome> {
        let mut outcomes = Vec::with_capacity(count as usize);
        for i in 0..count {
            let identity = Identity::fresh();
            let outcome = match self.fund(funder, &identity, amount).await {
                Ok(()) => FundingOutcome {
                    identity,
                    funded: true,
                    error: None,
                },
                Err(e) => {
                    warn!("funding identity {} of {} failed: {}", i + 1, count, e);
                    FundingOutcome {
                        identity,
                        funded: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);

            if (i + 1) % 5 == 0 {
                info!("provisioned {}/{} identities", i + 1, count);
            }
            if i + 1 < count {
                sleep(self.funding_delay).await;
            }
        }
        outcomes
    }

    async fn fund(&self, funder: &Wallet, identity: &Identity, amount: u128) -> anyhow::Result<()> {
        let tx_ref = self
            .ledger
            .transfer(funder, identity.address(), amount)
            .await?;
        let confirmation = self.ledger.await_confirmation(tx_ref).await?;
        if !confirmation.is_ok() {
            anyhow::bail!("funding transfer reverted");
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
