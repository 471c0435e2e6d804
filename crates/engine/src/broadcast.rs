//! Fan-out of run events to connected observers.
//!
//! The gateway registers one observer per WebSocket connection; the
//! engine pushes progress, results, errors and a periodic heartbeat
//! through the [`Broadcaster`]. Delivery is best effort: an observer
//! whose channel is gone is dropped on the spot and never blocks a run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use paraprobe_common::{now_millis, Address, TestResult};

use crate::dispatcher::{BurstObserver, BurstProgress};

// ════════════════════════════════════════════════════════════════════════════
// OBSERVER MESSAGES
// ════════════════════════════════════════════════════════════════════════════

/// One frame pushed to every connected observer.
///
/// Serialized as JSON with a `type` tag, so a consumer can dispatch on
/// the variant without knowing the full schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverMessage {
    /// A run was accepted and is provisioning identities.
    TestStarted {
        target: Address,
        function_name: String,
        bot_count: u32,
        burst_size: u32,
    },
    /// Running tally, emitted once per resolved call.
    Progress {
        completed: u32,
        total: u32,
        succeeded: u32,
        failed: u32,
        last_latency_ms: u64,
    },
    /// Final scored record of a finished run.
    Result { result: TestResult },
    /// A run or a requested test failed.
    Error { message: String },
    /// Periodic liveness signal with the current observer count.
    Heartbeat { timestamp_ms: u64, observers: usize },
}

impl ObserverMessage {
    /// Shorthand for the error frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ObserverMessage::Error {
            message: message.into(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// BROADCASTER
// ════════════════════════════════════════════════════════════════════════════

/// Registry of observer channels with best-effort fan-out.
///
/// Each message is serialized exactly once and the resulting frame is
/// cloned into every observer channel. A failed send means the receiving
/// side is gone; the observer is removed immediately.
pub struct Broadcaster {
    /// Connected observers, keyed by subscription id.
    observers: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    /// Next subscription id to hand out.
    next_id: AtomicU64,
    /// Interval between heartbeat frames (milliseconds).
    heartbeat_ms: u64,
    /// Flag to track if the heartbeat task is running.
    running: AtomicBool,
    /// Notify for heartbeat shutdown coordination.
    shutdown_notify: Arc<Notify>,
}

impl Broadcaster {
    #[must_use]
    pub fn new(heartbeat_ms: u64) -> Self {
        Broadcaster {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            heartbeat_ms,
            running: AtomicBool::new(false),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    /// Register a new observer. Returns its id and the receiving end of
    /// its channel; the caller forwards frames until the channel closes.
    pub fn subscribe(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().insert(id, tx);
        debug!("observer {} subscribed", id);
        (id, rx)
    }

    /// Remove an observer, usually after its connection closed.
    pub fn unsubscribe(&self, id: u64) {
        if self.observers.lock().remove(&id).is_some() {
            debug!("observer {} unsubscribed", id);
        }
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    // ── Fan-out ─────────────────────────────────────────────────────────────

    /// Push `message` to every connected observer, dropping any whose
    /// channel has closed.
    pub fn broadcast(&self, message: &ObserverMessage) {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("observer message failed to serialize: {}", e);
                return;
            }
        };
        let mut observers = self.observers.lock();
        observers.retain(|id, sender| {
            if sender.send(frame.clone()).is_ok() {
                true
            } else {
                debug!("observer {} gone, dropping", id);
                false
            }
        });
    }

    // ── Heartbeat lifecycle ─────────────────────────────────────────────────

    /// Start the periodic heartbeat task. Returns `false` if it is
    /// already running; a second task is never spawned.
    pub fn start_heartbeat(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let broadcaster = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown_notify);
        let period = Duration::from_millis(self.heartbeat_ms);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let observers = broadcaster.observer_count();
                        if observers > 0 {
                            broadcaster.broadcast(&ObserverMessage::Heartbeat {
                                timestamp_ms: now_millis(),
                                observers,
                            });
                        }
                    }
                    _ = shutdown.notified() => {
                        broadcaster.running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        true
    }

    /// Signal the heartbeat task to exit. Returns immediately; use
    /// [`Broadcaster::heartbeat_running`] to check completion.
    pub fn stop_heartbeat(&self) {
        if self.running.load(Ordering::SeqCst) {
            self.shutdown_notify.notify_one();
        }
    }

    #[must_use]
    pub fn heartbeat_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// DISPATCH PROGRESS BRIDGE
// ════════════════════════════════════════════════════════════════════════════

impl BurstObserver for Broadcaster {
    fn on_progress(&self, progress: BurstProgress) {
        self.broadcast(&ObserverMessage::Progress {
            completed: progress.completed,
            total: progress.total,
            succeeded: progress.succeeded,
            failed: progress.failed,
            last_latency_ms: progress.last_latency_ms,
        });
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_observer() {
        let broadcaster = Broadcaster::new(30_000);
        let (_, mut rx_a) = broadcaster.subscribe();
        let (_, mut rx_b) = broadcaster.subscribe();

        broadcaster.broadcast(&ObserverMessage::error("boom"));

        let frame_a = rx_a.try_recv().unwrap();
        let frame_b = rx_b.try_recv().unwrap();
        assert_eq!(frame_a, frame_b);
        assert!(frame_a.contains("\"type\":\"error\""));
        assert!(frame_a.contains("boom"));
    }

    #[tokio::test]
    async fn test_closed_observer_dropped_on_broadcast() {
        let broadcaster = Broadcaster::new(30_000);
        let (_, mut rx_a) = broadcaster.subscribe();
        let (_, rx_b) = broadcaster.subscribe();
        let (_, mut rx_c) = broadcaster.subscribe();
        assert_eq!(broadcaster.observer_count(), 3);

        drop(rx_b);
        broadcaster.broadcast(&ObserverMessage::error("still here"));

        assert_eq!(broadcaster.observer_count(), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_observer() {
        let broadcaster = Broadcaster::new(30_000);
        let (id, mut rx) = broadcaster.subscribe();
        broadcaster.unsubscribe(id);

        assert_eq!(broadcaster.observer_count(), 0);
        broadcaster.broadcast(&ObserverMessage::error("nobody listening"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_messages_carry_type_tags() {
        let started = ObserverMessage::TestStarted {
            target: Address::from_bytes([1u8; 20]),
            function_name: "increment".to_string(),
            bot_count: 30,
            burst_size: 30,
        };
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&started).unwrap())
            .unwrap();
        assert_eq!(v["type"], "test_started");
        assert_eq!(v["bot_count"], 30);

        let progress = ObserverMessage::Progress {
            completed: 3,
            total: 10,
            succeeded: 2,
            failed: 1,
            last_latency_ms: 120,
        };
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&progress).unwrap())
            .unwrap();
        assert_eq!(v["type"], "progress");
        assert_eq!(v["last_latency_ms"], 120);

        let heartbeat = ObserverMessage::Heartbeat {
            timestamp_ms: 1_000,
            observers: 2,
        };
        let v: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&heartbeat).unwrap()).unwrap();
        assert_eq!(v["type"], "heartbeat");
        assert_eq!(v["observers"], 2);
    }

    #[tokio::test]
    async fn test_heartbeat_start_stop() {
        let broadcaster = Arc::new(Broadcaster::new(20));
        let (_, mut rx) = broadcaster.subscribe();

        assert!(!broadcaster.heartbeat_running());
        assert!(broadcaster.start_heartbeat());
        assert!(broadcaster.heartbeat_running());
        // A second start must not spawn a duplicate task.
        assert!(!broadcaster.start_heartbeat());

        tokio::time::sleep(Duration::from_millis(120)).await;

        let mut beats = 0;
        while let Ok(frame) = rx.try_recv() {
            if frame.contains("\"type\":\"heartbeat\"") {
                beats += 1;
            }
        }
        assert!(beats >= 1, "expected at least one heartbeat, got {}", beats);

        broadcaster.stop_heartbeat();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!broadcaster.heartbeat_running());
    }

    #[tokio::test]
    async fn test_progress_bridge_emits_progress_frames() {
        let broadcaster = Broadcaster::new(30_000);
        let (_, mut rx) = broadcaster.subscribe();

        broadcaster.on_progress(BurstProgress {
            completed: 1,
            total: 5,
            succeeded: 1,
            failed: 0,
            last_latency_ms: 42,
        });

        let frame = rx.try_recv().unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "progress");
        assert_eq!(v["completed"], 1);
        assert_eq!(v["total"], 5);
    }
}
