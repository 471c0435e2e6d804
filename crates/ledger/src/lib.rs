//! # Paraprobe Ledger Crate
//!
//! Everything that touches the ledger network: signing identities, the
//! RPC client boundary, its HTTP implementation, and a scripted test
//! double.
//!
//! ## Modules
//! - `wallet`: ed25519 wallets and ephemeral identities
//! - `transport`: the `LedgerClient` trait and wire types
//! - `http`: `HttpLedger`, a reqwest JSON client
//! - `mock`: `MockLedger`, FIFO-scripted for tests
//!
//! ## Usage
//! ```rust,ignore
//! let ledger: Arc<dyn LedgerClient> = Arc::new(HttpLedger::new(endpoint, 60_000)?);
//! let authority = Wallet::from_secret_hex(&key)?;
//! let tx_ref = ledger.transfer(&authority, identity.address(), amount).await?;
//! ```

pub mod http;
pub mod mock;
pub mod transport;
pub mod wallet;

pub use http::HttpLedger;
pub use mock::MockLedger;
pub use transport::{CallStatus, Confirmation, LedgerClient, ProbeCall};
pub use wallet::{address_from_public_key, Identity, Wallet};
