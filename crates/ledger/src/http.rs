//! HTTP implementation of the ledger boundary.
//!
//! Talks JSON to a ledger gateway: transactions are POSTed with the
//! sender's public key and an ed25519 signature over a domain-prefixed
//! canonical payload, receipts are polled until the transaction reaches
//! a terminal status or the configured confirmation window expires.
//!
//! Endpoints, relative to the configured base URL:
//!   POST /tx                submit a probe call
//!   GET  /tx/{ref}/receipt  fetch a receipt (404 while pending)
//!   POST /transfer          move funds between accounts
//!   GET  /height            current chain height
//!   GET  /code/{addr}       deployed code, hex (empty if none)
//!   GET  /events            request-log entries over a height window
//!   POST /results           store a completed test result

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;

use paraprobe_common::{Address, BlockHeight, Hash32, TestRequest, TestResult};

use crate::transport::{CallStatus, Confirmation, LedgerClient, ProbeCall};
use crate::wallet::Wallet;

/// Delay between receipt polls while a transaction is pending.
const RECEIPT_POLL_MS: u64 = 500;

// ════════════════════════════════════════════════════════════════════════════
// SIGNING PAYLOADS
// ════════════════════════════════════════════════════════════════════════════
// Domain-prefixed canonical bytes. The prefix keeps a signature for one
// operation kind unusable for another.

fn call_signing_bytes(call: &ProbeCall) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(77 + call.function_name.len());
    bytes.extend_from_slice(b"paraprobe/call/v1");
    bytes.extend_from_slice(call.target.as_bytes());
    bytes.extend_from_slice(call.function_name.as_bytes());
    bytes.extend_from_slice(call.tag.as_bytes());
    bytes.extend_from_slice(&call.gas_limit.to_be_bytes());
    bytes
}

fn transfer_signing_bytes(to: Address, amount: u128) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(57);
    bytes.extend_from_slice(b"paraprobe/transfer/v1");
    bytes.extend_from_slice(to.as_bytes());
    bytes.extend_from_slice(&amount.to_be_bytes());
    bytes
}

fn result_signing_bytes(log_address: Address, test_id: Hash32, result_json: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(71 + result_json.len());
    bytes.extend_from_slice(b"paraprobe/result/v1");
    bytes.extend_from_slice(log_address.as_bytes());
    bytes.extend_from_slice(test_id.as_bytes());
    bytes.extend_from_slice(result_json);
    bytes
}

// ════════════════════════════════════════════════════════════════════════════
// RESPONSE BODIES
// ════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct TxRefResponse {
    tx_ref: Hash32,
}

#[derive(Deserialize)]
struct ReceiptResponse {
    status: CallStatus,
    gas_used: u64,
}

#[derive(Deserialize)]
struct HeightResponse {
    height: BlockHeight,
}

#[derive(Deserialize)]
struct CodeResponse {
    /// Hex-encoded program bytes; empty string for plain accounts.
    code: String,
}

#[derive(Deserialize)]
struct EventsResponse {
    requests: Vec<TestRequest>,
}

// ════════════════════════════════════════════════════════════════════════════
// CLIENT
// ════════════════════════════════════════════════════════════════════════════

/// [`LedgerClient`] over a JSON HTTP gateway.
#[derive(Clone)]
pub struct HttpLedger {
    base: String,
    client: Client,
    confirm_timeout: Duration,
}

impl HttpLedger {
    /// Build a client for `endpoint`. `confirm_timeout_ms` bounds how long
    /// [`LedgerClient::await_confirmation`] polls one transaction.
    pub fn new(endpoint: impl Into<String>, confirm_timeout_ms: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build http client")?;
        let mut base = endpoint.into();
        while base.ends_with('/') {
            base.pop();
        }
        Ok(HttpLedger {
            base,
            client,
            confirm_timeout: Duration::from_millis(confirm_timeout_ms),
        })
    }

    /// One receipt probe. `Ok(None)` means not yet included.
    async fn try_receipt(&self, tx_ref: Hash32) -> anyhow::Result<Option<Confirmation>> {
        let url = format!("{}/tx/{}/receipt", self.base, tx_ref);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status.is_success() {
            let receipt = resp.json::<ReceiptResponse>().await?;
            Ok(Some(Confirmation {
                status: receipt.status,
                gas_used: receipt.gas_used,
            }))
        } else if status.as_u16() == 404 {
            Ok(None)
        } else {
            let t = resp.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("receipt fetch failed {} {}", status, t))
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedger {
    async fn submit(&self, sender: &Wallet, call: &ProbeCall) -> anyhow::Result<Hash32> {
        let url = format!("{}/tx", self.base);
        let signature = sender.sign(&call_signing_bytes(call))?;
        let body = serde_json::json!({
            "sender": hex::encode(sender.public_key()),
            "target": call.target,
            "function_name": call.function_name,
            "tag": call.tag,
            "gas_limit": call.gas_limit,
            "signature": hex::encode(signature),
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json::<TxRefResponse>().await?.tx_ref)
        } else {
            let t = resp.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("submit failed {} {}", status, t))
        }
    }

    async fn await_confirmation(&self, tx_ref: Hash32) -> anyhow::Result<Confirmation> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            if let Some(confirmation) = self.try_receipt(tx_ref).await? {
                return Ok(confirmation);
            }
            if Instant::now() >= deadline {
                anyhow::bail!(
                    "confirmation timed out after {} ms for tx {}",
                    self.confirm_timeout.as_millis(),
                    tx_ref
                );
            }
            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_MS)).await;
        }
    }

    async fn transfer(&self, from: &Wallet, to: Address, amount: u128) -> anyhow::Result<Hash32> {
        let url = format!("{}/transfer", self.base);
        let signature = from.sign(&transfer_signing_bytes(to, amount))?;
        let body = serde_json::json!({
            "from": hex::encode(from.public_key()),
            "to": to,
            // decimal string: base-unit amounts overflow JSON doubles
            "amount": amount.to_string(),
            "signature": hex::encode(signature),
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json::<TxRefResponse>().await?.tx_ref)
        } else {
            let t = resp.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("transfer failed {} {}", status, t))
        }
    }

    async fn height(&self) -> anyhow::Result<BlockHeight> {
        let url = format!("{}/height", self.base);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json::<HeightResponse>().await?.height)
        } else {
            let t = resp.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("height fetch failed {} {}", status, t))
        }
    }

    async fn code_at(&self, address: Address) -> anyhow::Result<Vec<u8>> {
        let url = format!("{}/code/{}", self.base, address);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status.is_success() {
            let body = resp.json::<CodeResponse>().await?;
            let cleaned = body.code.strip_prefix("0x").unwrap_or(&body.code);
            hex::decode(cleaned).context("ledger returned invalid code hex")
        } else {
            let t = resp.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("code fetch failed {} {}", status, t))
        }
    }

    async fn query_requests(
        &self,
        log_address: Address,
        from: BlockHeight,
        to: BlockHeight,
    ) -> anyhow::Result<Vec<TestRequest>> {
        let url = format!(
            "{}/events?log={}&from={}&to={}",
            self.base, log_address, from, to
        );
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json::<EventsResponse>().await?.requests)
        } else {
            let t = resp.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("event query failed {} {}", status, t))
        }
    }

    async fn store_result(
        &self,
        authority: &Wallet,
        log_address: Address,
        test_id: Hash32,
        result: &TestResult,
    ) -> anyhow::Result<Hash32> {
        let url = format!("{}/results", self.base);
        let result_json =
            serde_json::to_vec(result).context("failed to serialize test result")?;
        let signature =
            authority.sign(&result_signing_bytes(log_address, test_id, &result_json))?;
        let body = serde_json::json!({
            "log": log_address,
            "test_id": test_id,
            "authority": hex::encode(authority.public_key()),
            "result": result,
            "signature": hex::encode(signature),
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json::<TxRefResponse>().await?.tx_ref)
        } else {
            let t = resp.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("result store failed {} {}", status, t))
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slashes() {
        let ledger = HttpLedger::new("http://127.0.0.1:8545///", 60_000).unwrap();
        assert_eq!(ledger.base, "http://127.0.0.1:8545");

        let untouched = HttpLedger::new("http://ledger.internal:8545", 60_000).unwrap();
        assert_eq!(untouched.base, "http://ledger.internal:8545");
    }

    #[test]
    fn test_signing_payloads_are_domain_separated() {
        let target = Address::from_bytes([1u8; 20]);
        let call = ProbeCall {
            target,
            function_name: String::new(),
            tag: Hash32::from_bytes([0u8; 32]),
            gas_limit: 0,
        };
        let call_bytes = call_signing_bytes(&call);
        let transfer_bytes = transfer_signing_bytes(target, 0);
        let result_bytes = result_signing_bytes(target, Hash32::from_bytes([0u8; 32]), b"");

        assert!(call_bytes.starts_with(b"paraprobe/call/v1"));
        assert!(transfer_bytes.starts_with(b"paraprobe/transfer/v1"));
        assert!(result_bytes.starts_with(b"paraprobe/result/v1"));
        assert_ne!(call_bytes, transfer_bytes);
        assert_ne!(call_bytes, result_bytes);
    }

    #[test]
    fn test_call_signing_bytes_cover_every_field() {
        let base = ProbeCall {
            target: Address::from_bytes([1u8; 20]),
            function_name: "ping".to_string(),
            tag: Hash32::from_bytes([2u8; 32]),
            gas_limit: 100_000,
        };
        let reference = call_signing_bytes(&base);

        let mut changed = base.clone();
        changed.target = Address::from_bytes([9u8; 20]);
        assert_ne!(call_signing_bytes(&changed), reference);

        let mut changed = base.clone();
        changed.function_name = "pong".to_string();
        assert_ne!(call_signing_bytes(&changed), reference);

        let mut changed = base.clone();
        changed.tag = Hash32::from_bytes([9u8; 32]);
        assert_ne!(call_signing_bytes(&changed), reference);

        let mut changed = base;
        changed.gas_limit = 1;
        assert_ne!(call_signing_bytes(&changed), reference);
    }

    #[test]
    fn test_transfer_signing_bytes_bind_amount() {
        let to = Address::from_bytes([3u8; 20]);
        assert_ne!(
            transfer_signing_bytes(to, 100),
            transfer_signing_bytes(to, 101)
        );
    }
}
