//! HTTP handlers for the gateway.
//!
//! Every JSON surface lives here; the WebSocket observer bridge is in
//! [`crate::ws`].
//!
//! ## Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/health` | GET | Service health summary |
//! | `/api/test` | POST | Run a stress test, return its result |
//! | `/api/tests/active` | GET | Tests currently in flight |
//! | `/api/poller/start` | POST | Start request-log polling |
//! | `/api/poller/stop` | POST | Stop request-log polling |

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use paraprobe_common::{Address, RunParams};
use paraprobe_engine::{ActiveTestSnapshot, ObserverMessage, RunError};

use crate::state::AppState;

// ════════════════════════════════════════════════════════════════════════════
// REQUEST/RESPONSE TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Request body for POST /api/test.
///
/// Every field is optional at the wire level so a missing target or
/// function name produces a clean 400 with a message instead of a
/// deserialization rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct RunTestReq {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub bot_count: Option<u32>,
    #[serde(default)]
    pub burst_size: Option<u32>,
}

/// Response for GET /api/health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub ledger_endpoint: String,
    pub authority_address: Address,
    pub uptime_secs: u64,
    pub observers: usize,
    pub polling: bool,
}

/// Response for GET /api/tests/active.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveTestsResponse {
    pub count: usize,
    pub tests: Vec<ActiveTestSnapshot>,
}

// ════════════════════════════════════════════════════════════════════════════
// HEALTH
// ════════════════════════════════════════════════════════════════════════════

/// GET /api/health - service health summary
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger_endpoint: state.ledger_endpoint.clone(),
        authority_address: state.authority_address,
        uptime_secs: state.uptime_secs(),
        observers: state.broadcaster.observer_count(),
        polling: state.polling_active(),
    })
}

// ════════════════════════════════════════════════════════════════════════════
// TEST EXECUTION
// ════════════════════════════════════════════════════════════════════════════

/// POST /api/test - run one stress test inline and return its result
///
/// Counts are clamped to the configured maxima by the runner; unset
/// counts fall back to the configured defaults.
pub async fn run_test_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunTestReq>,
) -> (StatusCode, Json<Value>) {
    let target = match payload.target.as_deref() {
        None | Some("") => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "target is required"})),
            );
        }
        Some(raw) => match Address::from_hex(raw) {
            Ok(address) => address,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": format!("invalid target address: {}", e)})),
                );
            }
        },
    };

    let function_name = match payload.function_name {
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "function_name is required"})),
            );
        }
        Some(name) => name,
    };

    let params = RunParams {
        target,
        function_name,
        bot_count: payload.bot_count,
        burst_size: payload.burst_size,
        requester: None,
    };

    match state.runner.run(params).await {
        Ok(result) => {
            let body = serde_json::to_value(&result).unwrap_or_else(|_| json!({}));
            (StatusCode::OK, Json(body))
        }
        Err(RunError::InvalidParams(message)) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
        }
        Err(e) => {
            warn!("test run failed: {}", e);
            state
                .broadcaster
                .broadcast(&ObserverMessage::error(format!("test run failed: {}", e)));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ACTIVE TESTS
// ════════════════════════════════════════════════════════════════════════════

/// GET /api/tests/active - snapshot of requested tests in flight
pub async fn active_tests_handler(
    State(state): State<Arc<AppState>>,
) -> Json<ActiveTestsResponse> {
    let tests = state.registry.snapshot();
    Json(ActiveTestsResponse {
        count: tests.len(),
        tests,
    })
}

// ════════════════════════════════════════════════════════════════════════════
// POLLER LIFECYCLE
// ════════════════════════════════════════════════════════════════════════════

/// POST /api/poller/start - idempotent; reports the intended state
pub async fn start_poller_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<Value>) {
    match &state.poller {
        Some(poller) => {
            poller.start();
            (StatusCode::OK, Json(json!({"ok": true, "running": true})))
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "no request log address configured"})),
        ),
    }
}

/// POST /api/poller/stop - idempotent; reports the intended state
pub async fn stop_poller_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<Value>) {
    match &state.poller {
        Some(poller) => {
            poller.stop();
            (StatusCode::OK, Json(json!({"ok": true, "running": false})))
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "no request log address configured"})),
        ),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ROUTER BUILDER
// ════════════════════════════════════════════════════════════════════════════

/// All JSON routes. The caller attaches the WebSocket route and the
/// shared state:
/// ```ignore
/// let app = handlers::routes()
///     .route("/ws", get(ws::observer_socket))
///     .with_state(state);
/// ```
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/test", post(run_test_handler))
        .route("/api/tests/active", get(active_tests_handler))
        .route("/api/poller/start", post(start_poller_handler))
        .route("/api/poller/stop", post(stop_poller_handler))
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════
