//! Prometheus metrics for readiness, beacons and shutdown
//!
//! Gauges are refreshed from the live state on every scrape; counters are
//! incremented by the shutdown coordinator.

use crate::lifecycle::state::StateSnapshot;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

pub type SharedMetrics = Arc<Metrics>;

pub struct Metrics {
    registry: Registry,
    ready: IntGauge,
    shutting_down: IntGauge,
    live_beacons: IntGauge,
    shutdown_handler_failures: IntCounter,
    forced_exits: IntCounter,
}

/// Create the metrics registry with all collectors registered
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    let registry = Registry::new();

    let ready = IntGauge::new("lightship_ready", "1 when the service reports ready")?;
    let shutting_down = IntGauge::new(
        "lightship_shutting_down",
        "1 once the shutdown sequence has started",
    )?;
    let live_beacons = IntGauge::new(
        "lightship_live_beacons",
        "Number of beacons currently holding shutdown",
    )?;
    let shutdown_handler_failures = IntCounter::new(
        "lightship_shutdown_handler_failures_total",
        "Shutdown handlers that returned an error or panicked",
    )?;
    let forced_exits = IntCounter::new(
        "lightship_forced_exits_total",
        "Forced terminations requested by a shutdown timer",
    )?;

    registry.register(Box::new(ready.clone()))?;
    registry.register(Box::new(shutting_down.clone()))?;
    registry.register(Box::new(live_beacons.clone()))?;
    registry.register(Box::new(shutdown_handler_failures.clone()))?;
    registry.register(Box::new(forced_exits.clone()))?;

    Ok(Arc::new(Metrics {
        registry,
        ready,
        shutting_down,
        live_beacons,
        shutdown_handler_failures,
        forced_exits,
    }))
}

impl Metrics {
    /// Refresh the gauges from a state snapshot and beacon count
    pub fn observe(&self, state: StateSnapshot, live_beacons: usize) {
        self.ready.set(i64::from(state.ready));
        self.shutting_down.set(i64::from(state.shutting_down));
        self.live_beacons.set(live_beacons as i64);
    }

    pub fn record_handler_failure(&self) {
        self.shutdown_handler_failures.inc();
    }

    pub fn record_forced_exit(&self) {
        self.forced_exits.inc();
    }

    pub fn handler_failures(&self) -> u64 {
        self.shutdown_handler_failures.get()
    }

    pub fn forced_exits(&self) -> u64 {
        self.forced_exits.get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_all_metrics() {
        let metrics = create_metrics().expect("metrics registry");

        let body = metrics.encode().expect("encode");

        for name in [
            "lightship_ready",
            "lightship_shutting_down",
            "lightship_live_beacons",
            "lightship_shutdown_handler_failures_total",
            "lightship_forced_exits_total",
        ] {
            assert!(body.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_observe_sets_gauges() {
        let metrics = create_metrics().expect("metrics registry");

        metrics.observe(
            StateSnapshot {
                ready: true,
                shutting_down: false,
            },
            3,
        );

        let body = metrics.encode().expect("encode");
        assert!(body.contains("lightship_ready 1"));
        assert!(body.contains("lightship_shutting_down 0"));
        assert!(body.contains("lightship_live_beacons 3"));
    }

    #[test]
    fn test_counters_increment() {
        let metrics = create_metrics().expect("metrics registry");

        metrics.record_handler_failure();
        metrics.record_handler_failure();
        metrics.record_forced_exit();

        assert_eq!(metrics.handler_failures(), 2);
        assert_eq!(metrics.forced_exits(), 1);
    }
}
