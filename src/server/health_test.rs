//! Tests for health endpoints

use super::health::*;
use super::metrics::create_metrics;
use crate::lifecycle::beacon::BeaconRegistry;
use crate::lifecycle::coordinator::Transport;
use crate::lifecycle::state::ServiceState;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;

struct TestServer {
    state: ServiceState,
    beacons: BeaconRegistry,
    handle: ServerHandle,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let state = ServiceState::new();
        let beacons = BeaconRegistry::new();
        let metrics = create_metrics().expect("metrics registry");
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("valid address");

        let handle = start_probe_server(
            addr,
            ProbeState::new(state.clone(), beacons.clone(), metrics),
        )
        .await
        .expect("health server should bind");

        Self {
            state,
            beacons,
            handle,
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> (u16, String) {
        let response = self
            .client
            .get(format!("http://{}{}", self.handle.local_addr(), path))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .expect("Failed to connect to health server");
        let status = response.status().as_u16();
        let body = response.text().await.expect("body");
        (status, body)
    }
}

/// `/health` walks NOT_READY → READY → SHUTTING_DOWN
#[tokio::test]
async fn test_health_transitions() {
    let server = TestServer::start().await;

    assert_eq!(
        server.get("/health").await,
        (500, SERVER_IS_NOT_READY.to_string())
    );

    server.state.signal_ready();
    assert_eq!(server.get("/health").await, (200, SERVER_IS_READY.to_string()));

    server.state.freeze();
    assert_eq!(
        server.get("/health").await,
        (500, SERVER_IS_SHUTTING_DOWN.to_string())
    );
}

#[tokio::test]
async fn test_live_reports_shutdown_only() {
    let server = TestServer::start().await;

    // Not ready is still alive
    assert_eq!(
        server.get("/live").await,
        (200, SERVER_IS_NOT_SHUTTING_DOWN.to_string())
    );

    server.state.freeze();
    assert_eq!(
        server.get("/live").await,
        (500, SERVER_IS_SHUTTING_DOWN.to_string())
    );
}

#[tokio::test]
async fn test_ready_follows_ready_flag() {
    let server = TestServer::start().await;

    assert_eq!(server.get("/ready").await, (500, SERVER_IS_NOT_READY.to_string()));

    server.state.signal_ready();
    assert_eq!(server.get("/ready").await, (200, SERVER_IS_READY.to_string()));

    server.state.signal_not_ready();
    assert_eq!(server.get("/ready").await, (500, SERVER_IS_NOT_READY.to_string()));
}

/// The ready flag is forced on during shutdown, so `/ready` answers 200
#[tokio::test]
async fn test_ready_stays_ready_during_shutdown() {
    let server = TestServer::start().await;
    server.state.signal_not_ready();

    server.state.freeze();

    assert_eq!(server.get("/ready").await, (200, SERVER_IS_READY.to_string()));
}

#[tokio::test]
async fn test_metrics_reflect_live_state() {
    let server = TestServer::start().await;
    server.state.signal_ready();
    let _beacon = server.beacons.create_beacon(json!({ "job": "metrics-test" }));

    let (status, body) = server.get("/metrics").await;

    assert_eq!(status, 200);
    assert!(body.contains("lightship_ready 1"));
    assert!(body.contains("lightship_live_beacons 1"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let server = TestServer::start().await;

    let (status, _) = server.get("/healthz").await;

    assert_eq!(status, 404);
}

/// Closing stops the listener; a second close reports an error
#[tokio::test]
async fn test_close_stops_server() {
    let server = TestServer::start().await;
    let addr = server.handle.local_addr();
    let _ = server.get("/live").await;

    tokio::time::timeout(Duration::from_secs(5), server.handle.close())
        .await
        .expect("close should finish")
        .expect("close should succeed");

    let result = reqwest::Client::new()
        .get(format!("http://{}/live", addr))
        .timeout(Duration::from_millis(500))
        .send()
        .await;
    assert!(result.is_err(), "closed server should refuse connections");

    assert!(server.handle.close().await.is_err());
}

/// Dropping the handle fires the close path as well
#[tokio::test]
async fn test_dropping_handle_stops_server() {
    let server = TestServer::start().await;
    let addr = server.handle.local_addr();
    assert_eq!(server.get("/live").await.0, 200);

    drop(server);

    let client = reqwest::Client::new();
    let mut refused = false;
    for _ in 0..50 {
        let result = client
            .get(format!("http://{}/live", addr))
            .timeout(Duration::from_millis(100))
            .send()
            .await;
        if result.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(refused, "server should stop once its handle is dropped");
}
