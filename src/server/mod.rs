//! HTTP server for probe and metrics endpoints
//!
//! Provides Kubernetes probes:
//! - `/health` - Ready and not shutting down
//! - `/live` - Liveness probe (shutdown not started)
//! - `/ready` - Readiness probe (ready flag set)

pub mod health;
pub mod metrics;

pub use health::{start_probe_server, ProbeState, ServerHandle};
pub use metrics::{create_metrics, SharedMetrics};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "health_test.rs"]
mod health_tests;
