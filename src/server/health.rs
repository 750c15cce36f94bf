//! Probe endpoints for Kubernetes
//!
//! - `/health` - Combined: ready and not shutting down
//! - `/live` - Liveness: 500 once the shutdown sequence has started
//! - `/ready` - Readiness: 200 while the ready flag is set
//! - `/metrics` - Prometheus metrics in text format
//!
//! During shutdown `/ready` keeps answering 200 because the ready flag is
//! forced on; `/health` and `/live` report the shutdown.

use crate::lifecycle::beacon::BeaconRegistry;
use crate::lifecycle::coordinator::Transport;
use crate::lifecycle::state::{Phase, ServiceState};
use crate::server::metrics::SharedMetrics;
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

pub const SERVER_IS_NOT_READY: &str = "SERVER_IS_NOT_READY";
pub const SERVER_IS_NOT_SHUTTING_DOWN: &str = "SERVER_IS_NOT_SHUTTING_DOWN";
pub const SERVER_IS_READY: &str = "SERVER_IS_READY";
pub const SERVER_IS_SHUTTING_DOWN: &str = "SERVER_IS_SHUTTING_DOWN";

/// Combined state for probe and metrics endpoints
#[derive(Clone)]
pub struct ProbeState {
    state: ServiceState,
    beacons: BeaconRegistry,
    metrics: SharedMetrics,
}

impl ProbeState {
    pub fn new(state: ServiceState, beacons: BeaconRegistry, metrics: SharedMetrics) -> Self {
        Self {
            state,
            beacons,
            metrics,
        }
    }
}

async fn health(State(probe): State<ProbeState>) -> (StatusCode, &'static str) {
    match probe.state.snapshot().phase() {
        Phase::ShuttingDown => (StatusCode::INTERNAL_SERVER_ERROR, SERVER_IS_SHUTTING_DOWN),
        Phase::Ready => (StatusCode::OK, SERVER_IS_READY),
        Phase::NotReady => (StatusCode::INTERNAL_SERVER_ERROR, SERVER_IS_NOT_READY),
    }
}

async fn live(State(probe): State<ProbeState>) -> (StatusCode, &'static str) {
    if probe.state.is_shutting_down() {
        (StatusCode::INTERNAL_SERVER_ERROR, SERVER_IS_SHUTTING_DOWN)
    } else {
        (StatusCode::OK, SERVER_IS_NOT_SHUTTING_DOWN)
    }
}

async fn ready(State(probe): State<ProbeState>) -> (StatusCode, &'static str) {
    if probe.state.is_ready() {
        (StatusCode::OK, SERVER_IS_READY)
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, SERVER_IS_NOT_READY)
    }
}

/// Prometheus metrics handler
async fn metrics(State(probe): State<ProbeState>) -> impl IntoResponse {
    probe
        .metrics
        .observe(probe.state.snapshot(), probe.beacons.len());

    match probe.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Build the router for probe and metrics endpoints
pub fn build_router(probe: ProbeState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/live", get(live))
        .route("/ready", get(ready))
        .route("/metrics", get(self::metrics))
        .with_state(probe)
}

/// Handle to a running probe server
///
/// Dropping the handle also closes the server: the close sender is dropped
/// with it, which resolves the graceful-shutdown future.
pub struct ServerHandle {
    local_addr: SocketAddr,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl ServerHandle {
    /// Address the server is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Transport for ServerHandle {
    /// Stop accepting connections and wait for in-flight requests
    async fn close(&self) -> std::io::Result<()> {
        let close_tx = self
            .close_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(close_tx) = close_tx {
            // The server task may already have exited on its own
            let _ = close_tx.send(());
        }

        let task = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return Err(std::io::Error::other("server is not running"));
        };

        task.await.map_err(std::io::Error::other)?
    }
}

/// Bind the probe server and serve it in the background
///
/// Returns once the listener is bound, so probes are answerable as soon as
/// this resolves. Port 0 binds an ephemeral port.
pub async fn start_probe_server(
    addr: SocketAddr,
    probe: ProbeState,
) -> Result<ServerHandle, std::io::Error> {
    let app = build_router(probe);

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    // Log after successful bind - server is actually listening
    info!(port = local_addr.port(), "Lightship HTTP service is running");

    let (close_tx, close_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                // Fired by `close()` or by dropping the handle
                let _ = close_rx.await;
            })
            .await
    });

    Ok(ServerHandle {
        local_addr,
        close_tx: Mutex::new(Some(close_tx)),
        task: Mutex::new(Some(task)),
    })
}
