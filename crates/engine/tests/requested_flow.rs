//! End-to-end flows for on-chain requested tests: discovery through the
//! polling loop, execution, result storage and registry cleanup, all
//! against a scripted ledger.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;

use paraprobe_common::config::{PollerConfig, TestConfig};
use paraprobe_common::{Address, Hash32, TestRequest};
use paraprobe_engine::{ActiveTests, Broadcaster, RequestPoller, TestRunner};
use paraprobe_ledger::{Confirmation, LedgerClient, MockLedger, Wallet};

const REQUESTER: [u8; 20] = [0x51; 20];
const TARGET: [u8; 20] = [0x42; 20];
const LOG: [u8; 20] = [0xee; 20];

struct Harness {
    mock: Arc<MockLedger>,
    registry: Arc<ActiveTests>,
    broadcaster: Arc<Broadcaster>,
    poller: Arc<RequestPoller>,
}

/// Wire a poller over a fresh mock, polling every 20ms.
fn harness(funding_delay_ms: u64) -> Harness {
    let mock = Arc::new(MockLedger::default());
    let registry = Arc::new(ActiveTests::new());
    let broadcaster = Arc::new(Broadcaster::new(30_000));
    let authority = Wallet::generate();
    let runner = Arc::new(TestRunner::new(
        Arc::clone(&mock) as Arc<dyn LedgerClient>,
        authority.clone(),
        TestConfig {
            default_bot_count: 2,
            default_burst_size: 2,
            max_bot_count: 4,
            max_burst_size: 4,
            funding_amount: 1_000,
            funding_delay_ms,
        },
        100_000,
        Some(Arc::clone(&broadcaster)),
    ));
    let poller = Arc::new(RequestPoller::new(
        Arc::clone(&mock) as Arc<dyn LedgerClient>,
        runner,
        Arc::clone(&registry),
        Arc::clone(&broadcaster),
        authority,
        Address::from_bytes(LOG),
        &PollerConfig {
            interval_ms: 20,
            store_attempts: 3,
        },
    ));
    Harness {
        mock,
        registry,
        broadcaster,
        poller,
    }
}

fn request(id: u8, tx_count: u32) -> TestRequest {
    TestRequest {
        request_id: Hash32::from_bytes([id; 32]),
        requester: Address::from_bytes(REQUESTER),
        target: Address::from_bytes(TARGET),
        function_name: "increment".to_string(),
        tx_count,
        timestamp: 1_700_000_000,
    }
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Drain observer frames until an error frame shows up; returns its
/// message.
async fn wait_for_error_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    for _ in 0..300 {
        while let Ok(frame) = rx.try_recv() {
            let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
            if v["type"] == "error" {
                return v["message"].as_str().unwrap_or("").to_string();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for an error frame");
}

#[tokio::test]
async fn test_discovered_request_runs_and_stores_result() {
    let h = harness(0);
    let (_, mut rx) = h.broadcaster.subscribe();

    h.mock.push_height(100);
    h.mock.push_height(101);
    h.mock.push_requests(vec![request(1, 2)]);
    h.mock.push_code(vec![0x60, 0x60]);
    for i in 0..2u8 {
        h.mock.push_transfer(Hash32::from_bytes([0x10 + i; 32]));
        h.mock.push_confirmation(Confirmation::ok(21_000));
    }
    for i in 0..2u8 {
        h.mock.push_submit(Hash32::from_bytes([0x40 + i; 32]));
        h.mock.push_confirmation(Confirmation::ok(30_000));
    }
    h.mock.push_store(Hash32::from_bytes([0x99; 32]));
    h.mock.push_confirmation(Confirmation::ok(21_000));

    assert!(h.poller.start());
    wait_until("stored result and clean registry", || {
        !h.mock.stored_results().is_empty() && h.registry.is_empty()
    })
    .await;
    h.poller.stop();

    assert_eq!(h.mock.queried_windows(), vec![(101, 101)]);
    assert_eq!(h.mock.transfers_made().len(), 2);
    assert_eq!(h.mock.submitted_calls().len(), 2);

    let stored = h.mock.stored_results();
    assert_eq!(stored.len(), 1);
    let (test_id, result) = &stored[0];
    assert_ne!(*test_id, Hash32::from_bytes([0u8; 32]));
    assert_eq!(result.sent, 2);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.requester, Address::from_bytes(REQUESTER));
    assert_eq!(result.target, Address::from_bytes(TARGET));

    let mut types = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        types.push(v["type"].as_str().unwrap_or("").to_string());
    }
    assert!(types.contains(&"test_started".to_string()));
    assert!(types.contains(&"result".to_string()));
    assert!(!types.contains(&"error".to_string()));
}

#[tokio::test]
async fn test_request_seen_twice_runs_once() {
    // Slow provisioning keeps the first run in flight while the next
    // polling cycles rediscover the same request.
    let h = harness(150);

    h.mock.push_height(100);
    h.mock.push_height(101);
    h.mock.push_height(102);
    h.mock.push_requests(vec![request(2, 2)]);
    h.mock.push_requests(vec![request(2, 2)]);
    h.mock.push_code(vec![0x60]);
    for i in 0..2u8 {
        h.mock.push_transfer(Hash32::from_bytes([0x10 + i; 32]));
        h.mock.push_confirmation(Confirmation::ok(21_000));
    }
    for i in 0..2u8 {
        h.mock.push_submit(Hash32::from_bytes([0x40 + i; 32]));
        h.mock.push_confirmation(Confirmation::ok(30_000));
    }
    h.mock.push_store(Hash32::from_bytes([0x99; 32]));
    h.mock.push_confirmation(Confirmation::ok(21_000));

    assert!(h.poller.start());
    wait_until("single stored result", || {
        !h.mock.stored_results().is_empty() && h.registry.is_empty()
    })
    .await;
    h.poller.stop();

    // Both windows were queried, but only one burst went out.
    assert_eq!(h.mock.queried_windows(), vec![(101, 101), (102, 102)]);
    assert_eq!(h.mock.submitted_calls().len(), 2);
    assert_eq!(h.mock.stored_results().len(), 1);
}

#[tokio::test]
async fn test_request_for_codeless_target_reports_error() {
    let h = harness(0);
    let (_, mut rx) = h.broadcaster.subscribe();

    h.mock.push_height(100);
    h.mock.push_height(101);
    h.mock.push_requests(vec![request(3, 2)]);
    h.mock.push_code(Vec::new());

    assert!(h.poller.start());
    let message = wait_for_error_frame(&mut rx).await;
    // The error frame goes out just before the registry entry is
    // dropped; give the cleanup a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.poller.stop();

    assert!(message.contains("no program code"));
    assert!(h.registry.is_empty());
    assert!(h.mock.transfers_made().is_empty());
    assert!(h.mock.submitted_calls().is_empty());
    assert!(h.mock.stored_results().is_empty());
}

#[tokio::test]
async fn test_result_storage_retried_until_it_lands() {
    let h = harness(0);

    h.mock.push_height(100);
    h.mock.push_height(101);
    h.mock.push_requests(vec![request(4, 1)]);
    h.mock.push_code(vec![0x60]);
    h.mock.push_transfer(Hash32::from_bytes([0x10; 32]));
    h.mock.push_confirmation(Confirmation::ok(21_000));
    h.mock.push_submit(Hash32::from_bytes([0x40; 32]));
    h.mock.push_confirmation(Confirmation::ok(30_000));
    // Two attempts bounce, the third lands.
    h.mock.fail_store("ledger busy");
    h.mock.fail_store("ledger busy");
    h.mock.push_store(Hash32::from_bytes([0x99; 32]));
    h.mock.push_confirmation(Confirmation::ok(21_000));

    assert!(h.poller.start());
    wait_until("three storage attempts and clean registry", || {
        h.mock.stored_results().len() == 3 && h.registry.is_empty()
    })
    .await;
    h.poller.stop();

    let stored = h.mock.stored_results();
    assert_eq!(stored.len(), 3);
    // Every attempt carried the same record under the same test id.
    assert!(stored.iter().all(|(id, _)| *id == stored[0].0));
    assert!(stored.iter().all(|(_, r)| r.sent == 1));
}

#[tokio::test]
async fn test_requested_run_failure_reports_and_cleans_up() {
    let h = harness(0);
    let (_, mut rx) = h.broadcaster.subscribe();

    h.mock.push_height(100);
    h.mock.push_height(101);
    h.mock.push_requests(vec![request(5, 2)]);
    h.mock.push_code(vec![0x60]);
    h.mock.fail_transfer("authority account empty");
    h.mock.fail_transfer("authority account empty");

    assert!(h.poller.start());
    let message = wait_for_error_frame(&mut rx).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.poller.stop();

    assert!(message.contains("no identities could be funded"));
    assert!(h.registry.is_empty());
    assert!(h.mock.submitted_calls().is_empty());
    assert!(h.mock.stored_results().is_empty());
}
