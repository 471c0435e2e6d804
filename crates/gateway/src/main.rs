//! # Paraprobe Gateway
//!
//! HTTP/WebSocket front end for the parallel-execution stress-test
//! engine.
//!
//! ## Architecture
//! ```text
//! Client → Gateway → TestRunner → Ledger RPC
//!    │         │          ↑
//!    └──WS─────┘    RequestPoller (on-chain requests)
//! ```
//!
//! ## Endpoints
//! - GET /api/health - Service health summary
//! - POST /api/test - Run a stress test, return its result
//! - GET /api/tests/active - Tests currently in flight
//! - POST /api/poller/start - Start request-log polling
//! - POST /api/poller/stop - Stop request-log polling
//! - GET /ws - Observer WebSocket stream
//!
//! ## Startup
//! Configuration loads from an optional TOML file (first CLI argument or
//! `PARAPROBE_CONFIG`), then environment overrides apply on top. Request
//! polling starts automatically when a request log address is
//! configured.

mod handlers;
mod state;
mod ws;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use tracing::{error, info};

use paraprobe_common::config::ServiceConfig;
use paraprobe_common::now_secs;
use paraprobe_engine::{ActiveTests, Broadcaster, RequestPoller, TestRunner};
use paraprobe_ledger::{HttpLedger, LedgerClient, Wallet};

use state::AppState;

/// Resolve and load the configuration: first CLI argument, then
/// `PARAPROBE_CONFIG`, then built-in defaults. Environment overrides and
/// validation apply in every case.
fn load_config() -> anyhow::Result<ServiceConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PARAPROBE_CONFIG").ok());
    let mut config = match path {
        Some(path) => ServiceConfig::load_from_file(&path)?,
        None => ServiceConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    // Step 1: configuration
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Step 2: authority wallet
    let authority = match config
        .ledger
        .authority_key
        .as_deref()
        .map(Wallet::from_secret_hex)
    {
        Some(Ok(wallet)) => wallet,
        Some(Err(e)) => {
            error!("invalid authority key: {}", e);
            std::process::exit(1);
        }
        None => {
            error!(
                "authority key is required (set ledger.authority_key or PARAPROBE_AUTHORITY_KEY)"
            );
            std::process::exit(1);
        }
    };

    // Step 3: ledger client
    let ledger: Arc<dyn LedgerClient> = match HttpLedger::new(
        config.ledger.endpoint.clone(),
        config.ledger.confirm_timeout_ms,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("failed to build ledger client: {}", e);
            std::process::exit(1);
        }
    };

    // Step 4: engine assembly
    let broadcaster = Arc::new(Broadcaster::new(config.observer.heartbeat_ms));
    let registry = Arc::new(ActiveTests::new());
    let runner = Arc::new(TestRunner::new(
        Arc::clone(&ledger),
        authority.clone(),
        config.test.clone(),
        config.ledger.gas_limit,
        Some(Arc::clone(&broadcaster)),
    ));
    let poller = config.ledger.request_log_address.map(|log_address| {
        Arc::new(RequestPoller::new(
            Arc::clone(&ledger),
            Arc::clone(&runner),
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
            authority.clone(),
            log_address,
            &config.poller,
        ))
    });

    // Step 5: background lifecycles
    broadcaster.start_heartbeat();
    if let Some(poller) = &poller {
        poller.start();
    }

    // Step 6: shared state and router
    let state = Arc::new(AppState {
        runner,
        poller,
        registry,
        broadcaster,
        ledger_endpoint: config.ledger.endpoint.clone(),
        authority_address: authority.address(),
        started_at: now_secs(),
    });
    let app = handlers::routes()
        .route("/ws", get(ws::observer_socket))
        .with_state(Arc::clone(&state));

    // Step 7: bind and announce
    let addr: SocketAddr = match config.server.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(
                "invalid listen address '{}': {}",
                config.server.listen_addr, e
            );
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!(listen_addr = %addr, "paraprobe gateway listening");
    info!(
        ledger_endpoint = %config.ledger.endpoint,
        authority = %authority.address(),
        "ledger configured"
    );
    match &config.ledger.request_log_address {
        Some(log_address) => info!(
            request_log = %log_address,
            interval_ms = config.poller.interval_ms,
            "request polling active"
        ),
        None => info!("request polling disabled: no request log address configured"),
    }

    // Step 8: serve until shutdown
    let server = axum::serve(listener, app).into_future();
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            if let Some(poller) = &state.poller {
                poller.stop();
            }
            state.broadcaster.stop_heartbeat();
        }
    }

    info!("gateway shutdown complete");
}
