//! Service configuration.
//!
//! Settings load from an optional TOML file, then environment variables
//! override the deployment-sensitive fields, then `validate` checks the
//! result before anything starts. Every field has a default so an empty
//! file (or no file at all) yields a runnable local configuration.
//!
//! Environment overrides:
//! - `PARAPROBE_LISTEN_ADDR`     → `server.listen_addr`
//! - `PARAPROBE_LEDGER_ENDPOINT` → `ledger.endpoint`
//! - `PARAPROBE_AUTHORITY_KEY`   → `ledger.authority_key`
//! - `PARAPROBE_REQUEST_LOG`     → `ledger.request_log_address`

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::types::Address;

// ════════════════════════════════════════════════════════════════════════════
// SECTIONS
// ════════════════════════════════════════════════════════════════════════════

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: "127.0.0.1:3001".to_string(),
        }
    }
}

/// Ledger connection and signing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub endpoint: String,
    /// Hex-encoded 32-byte secret key for the service authority.
    pub authority_key: Option<String>,
    /// Address of the on-chain request log program. Polling is disabled
    /// when absent.
    pub request_log_address: Option<Address>,
    pub gas_limit: u64,
    pub confirm_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            endpoint: "http://127.0.0.1:8545".to_string(),
            authority_key: None,
            request_log_address: None,
            gas_limit: 100_000,
            confirm_timeout_ms: 60_000,
        }
    }
}

/// Test sizing and identity funding settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub default_bot_count: u32,
    pub default_burst_size: u32,
    pub max_bot_count: u32,
    pub max_burst_size: u32,
    /// Amount transferred to each fresh identity, in the ledger's base unit.
    pub funding_amount: u128,
    pub funding_delay_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig {
            default_bot_count: 30,
            default_burst_size: 30,
            max_bot_count: 100,
            max_burst_size: 100,
            funding_amount: 100_000_000_000_000_000,
            funding_delay_ms: 100,
        }
    }
}

/// Request-log polling settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_ms: u64,
    /// Attempts made when publishing a result back on chain.
    pub store_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            interval_ms: 3_000,
            store_attempts: 3,
        }
    }
}

/// Observer stream settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub heartbeat_ms: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        ObserverConfig {
            heartbeat_ms: 30_000,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TOP-LEVEL CONFIG
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub test: TestConfig,
    pub poller: PollerConfig,
    pub observer: ObserverConfig,
}

impl ServiceConfig {
    /// Read and parse a TOML configuration file.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ServiceConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply environment variable overrides in place.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(addr) = std::env::var("PARAPROBE_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Ok(endpoint) = std::env::var("PARAPROBE_LEDGER_ENDPOINT") {
            self.ledger.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("PARAPROBE_AUTHORITY_KEY") {
            self.ledger.authority_key = Some(key);
        }
        if let Ok(addr) = std::env::var("PARAPROBE_REQUEST_LOG") {
            let parsed = Address::from_hex(&addr)
                .with_context(|| format!("invalid PARAPROBE_REQUEST_LOG value '{}'", addr))?;
            self.ledger.request_log_address = Some(parsed);
        }
        Ok(())
    }

    /// Reject configurations that cannot possibly run.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address '{}'", self.server.listen_addr))?;

        if self.ledger.endpoint.is_empty() {
            anyhow::bail!("ledger endpoint must not be empty");
        }

        match &self.ledger.authority_key {
            None => anyhow::bail!(
                "authority key is required (set ledger.authority_key or PARAPROBE_AUTHORITY_KEY)"
            ),
            Some(key) => {
                let key = key.strip_prefix("0x").unwrap_or(key);
                let bytes = hex::decode(key).context("authority key is not valid hex")?;
                if bytes.len() != 32 {
                    anyhow::bail!("authority key must be 32 bytes, got {}", bytes.len());
                }
            }
        }

        if self.test.default_bot_count == 0 || self.test.default_burst_size == 0 {
            anyhow::bail!("default bot count and burst size must be positive");
        }
        if self.test.default_bot_count > self.test.max_bot_count {
            anyhow::bail!(
                "default bot count {} exceeds maximum {}",
                self.test.default_bot_count,
                self.test.max_bot_count
            );
        }
        if self.test.default_burst_size > self.test.max_burst_size {
            anyhow::bail!(
                "default burst size {} exceeds maximum {}",
                self.test.default_burst_size,
                self.test.max_burst_size
            );
        }

        if self.poller.interval_ms == 0 {
            anyhow::bail!("poller interval must be positive");
        }
        if self.poller.store_attempts == 0 {
            anyhow::bail!("store attempts must be positive");
        }
        if self.observer.heartbeat_ms == 0 {
            anyhow::bail!("observer heartbeat must be positive");
        }

        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
