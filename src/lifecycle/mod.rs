//! Service lifecycle: readiness state, beacons and the shutdown sequence
//!
//! ```text
//! signal → coordinator: freeze state → drain beacons → run handlers → close server → exit
//! ```

pub mod beacon;
pub mod clock;
pub mod coordinator;
pub mod environment;
pub mod signals;
pub mod state;
pub mod terminator;

pub use beacon::{Beacon, BeaconContext, BeaconHandle, BeaconRegistry};
pub use coordinator::{ShutdownCoordinator, ShutdownHandler, Transport, EXIT_WATCHDOG_DELAY};
pub use environment::Environment;
pub use signals::SignalName;
pub use state::{Phase, ServiceState, StateSnapshot};
pub use terminator::{ProcessTerminator, Terminator, FORCED_EXIT_CODE};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "state_test.rs"]
mod state_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "beacon_test.rs"]
mod beacon_tests;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "coordinator_test.rs"]
mod coordinator_tests;
