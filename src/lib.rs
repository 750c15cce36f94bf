//! Liveness/readiness probes and graceful shutdown for services running
//! under Kubernetes.
//!
//! ```rust,ignore
//! let lightship = Lightship::start(Configuration::from_env()?).await?;
//!
//! lightship.register_shutdown_handler(|| async move {
//!     pool.close().await;
//!     Ok(())
//! });
//!
//! let beacon = lightship.create_beacon(json!({ "job": "export" }));
//! // ... in-flight work ...
//! beacon.release().await;
//!
//! lightship.signal_ready();
//! lightship.wait_closed().await;
//! ```

pub mod config;
pub mod lifecycle;
pub mod server;
pub mod service;

pub use config::{ConfigError, Configuration, ShutdownTimeout};
pub use lifecycle::{BeaconHandle, Environment, SignalName};
pub use service::{Lightship, LightshipBuilder, LightshipError};

