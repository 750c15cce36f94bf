//! The `Lightship` service handle
//!
//! Wires configuration, the probe server, the state machine, the beacon
//! registry and the shutdown coordinator into one instance. Every instance is
//! independent; nothing is process-global except the signal handlers bound
//! in orchestrated mode.

use crate::config::Configuration;
use crate::lifecycle::beacon::{Beacon, BeaconHandle, BeaconRegistry};
use crate::lifecycle::clock::{Clock, SystemClock};
use crate::lifecycle::coordinator::ShutdownCoordinator;
use crate::lifecycle::environment::Environment;
use crate::lifecycle::signals::bind_signals;
use crate::lifecycle::state::ServiceState;
use crate::lifecycle::terminator::{ProcessTerminator, Terminator};
use crate::server::health::{start_probe_server, ProbeState};
use crate::server::metrics::{create_metrics, SharedMetrics};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LightshipError {
    #[error("Failed to bind probe server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Builder for a `Lightship` instance
pub struct LightshipBuilder {
    config: Configuration,
    terminator: Arc<dyn Terminator>,
    clock: Arc<dyn Clock>,
    environment: Option<Environment>,
}

impl LightshipBuilder {
    /// Replace the process terminator used for forced exits
    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Replace the clock used to stamp beacons
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use this environment instead of detecting it
    ///
    /// Only consulted when `detect_kubernetes` is enabled.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Bind the probe server, wire signals and return the running instance
    pub async fn start(self) -> Result<Lightship, LightshipError> {
        let config = self.config;

        let environment = if config.detect_kubernetes {
            self.environment.unwrap_or_else(Environment::detect)
        } else {
            Environment::Undetected
        };
        let local = environment.is_local();

        let state = ServiceState::new();
        let beacons = BeaconRegistry::with_clock(self.clock);
        let metrics = create_metrics()?;

        // Local mode never claims the configured port
        let port = if local { 0 } else { config.port };
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let server = start_probe_server(
            addr,
            ProbeState::new(state.clone(), beacons.clone(), metrics.clone()),
        )
        .await
        .map_err(|source| LightshipError::Bind { port, source })?;
        let local_addr = server.local_addr();

        let coordinator = ShutdownCoordinator::new(
            state.clone(),
            beacons.clone(),
            config.timeout,
            self.terminator,
            metrics.clone(),
        );
        coordinator.set_transport(Arc::new(server));

        let signal_listeners = if local {
            warn!("shutdown handlers are not used in the local mode");
            Vec::new()
        } else {
            let on_signal = coordinator.clone();
            bind_signals(&config.signals, move |_| {
                let coordinator = on_signal.clone();
                tokio::spawn(async move { coordinator.shutdown().await });
            })
        };

        info!(
            port = local_addr.port(),
            environment = ?environment,
            timeout = ?config.timeout,
            "Lightship started"
        );

        Ok(Lightship {
            inner: Arc::new(Inner {
                config,
                environment,
                local_addr,
                state,
                beacons,
                metrics,
                coordinator,
                signal_listeners,
            }),
        })
    }
}

struct Inner {
    config: Configuration,
    environment: Environment,
    local_addr: SocketAddr,
    state: ServiceState,
    beacons: BeaconRegistry,
    metrics: SharedMetrics,
    coordinator: ShutdownCoordinator,
    signal_listeners: Vec<JoinHandle<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for listener in &self.signal_listeners {
            listener.abort();
        }
    }
}

/// Readiness reporting and graceful shutdown for one service
#[derive(Clone)]
pub struct Lightship {
    inner: Arc<Inner>,
}

impl Lightship {
    pub fn builder(config: Configuration) -> LightshipBuilder {
        LightshipBuilder {
            config,
            terminator: Arc::new(ProcessTerminator),
            clock: Arc::new(SystemClock),
            environment: None,
        }
    }

    /// Start with the production terminator and environment detection
    pub async fn start(config: Configuration) -> Result<Self, LightshipError> {
        Self::builder(config).start().await
    }

    /// Announce in-flight work that must finish before shutdown handlers run
    pub fn create_beacon(&self, context: Value) -> BeaconHandle {
        self.inner.beacons.create_beacon(context)
    }

    /// Live beacons, oldest first
    pub fn live_beacons(&self) -> Vec<Beacon> {
        self.inner.beacons.snapshot()
    }

    pub fn register_shutdown_handler<F, Fut>(&self, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.coordinator.register_shutdown_handler(handler);
    }

    pub fn signal_ready(&self) {
        self.inner.state.signal_ready();
    }

    pub fn signal_not_ready(&self) {
        self.inner.state.signal_not_ready();
    }

    /// Ready flag. Forced on during shutdown; check
    /// `is_server_shutting_down()` as well before routing new work.
    pub fn is_server_ready(&self) -> bool {
        self.inner.state.is_ready()
    }

    pub fn is_server_shutting_down(&self) -> bool {
        self.inner.state.is_shutting_down()
    }

    /// Run the shutdown sequence; see `ShutdownCoordinator::shutdown`
    pub async fn shutdown(&self) {
        self.inner.coordinator.shutdown().await;
    }

    /// Wait until the shutdown sequence has closed the probe server
    pub async fn wait_closed(&self) {
        self.inner.coordinator.wait_closed().await;
    }

    /// Address the probe server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Detected environment, or `Undetected` when detection is disabled
    pub fn environment(&self) -> Environment {
        self.inner.environment
    }

    pub fn configuration(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.inner.metrics
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "service_test.rs"]
mod tests;
