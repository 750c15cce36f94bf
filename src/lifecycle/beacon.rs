//! Beacons: handles for in-flight work that must finish before shutdown
//! proceeds to the shutdown handlers.
//!
//! The live set is held inside a `watch` channel. Every mutation goes through
//! `send_if_modified`, so waiters are only notified once the set is fully
//! updated, and a waiter always re-checks the current set rather than a delta.

use crate::lifecycle::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, trace, warn};
use uuid::Uuid;

/// Free-form diagnostic context attached to a beacon
pub type BeaconContext = Map<String, Value>;

/// A live unit of in-flight work
#[derive(Debug, Clone, Serialize)]
pub struct Beacon {
    pub id: Uuid,
    pub context: BeaconContext,
    pub created_at: DateTime<Utc>,
}

/// Registry of live beacons
#[derive(Clone)]
pub struct BeaconRegistry {
    live: Arc<watch::Sender<HashMap<Uuid, Beacon>>>,
    clock: Arc<dyn Clock>,
}

impl BeaconRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (live, _) = watch::channel(HashMap::new());
        Self {
            live: Arc::new(live),
            clock,
        }
    }

    /// Register a beacon for a unit of in-flight work.
    ///
    /// `context` is any JSON value: an object is used as-is, `null` means no
    /// context, and any other value is stored under `"value"`. Allowed at any
    /// time, including after shutdown started; the caller must still release.
    pub fn create_beacon(&self, context: Value) -> BeaconHandle {
        let context = match context {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        let beacon = Beacon {
            id: Uuid::new_v4(),
            context,
            created_at: self.clock.now(),
        };
        let id = beacon.id;

        trace!(beacon_id = %id, context = %serde_json::Value::Object(beacon.context.clone()), "beacon created");

        self.live.send_modify(|live| {
            live.insert(id, beacon);
        });

        BeaconHandle {
            id,
            registry: self.clone(),
            released: false,
        }
    }

    fn remove(&self, id: Uuid) {
        let mut removed = None;
        self.live.send_if_modified(|live| {
            removed = live.remove(&id);
            removed.is_some()
        });

        if let Some(beacon) = removed {
            let held_ms = self.clock.since(beacon.created_at).num_milliseconds();
            trace!(
                beacon_id = %id,
                context = %serde_json::Value::Object(beacon.context),
                held_ms = held_ms,
                "beacon has been killed"
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.live.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.live.borrow().len()
    }

    /// Live beacons, oldest first
    pub fn snapshot(&self) -> Vec<Beacon> {
        let mut beacons: Vec<Beacon> = self.live.borrow().values().cloned().collect();
        beacons.sort_by_key(|b| b.created_at);
        beacons
    }

    /// Wait until no beacons are live.
    ///
    /// Checks immediately, then again on every change to the live set.
    /// There is no bound here; the shutdown timeout is the only escape.
    pub async fn wait_until_empty(&self) {
        let mut rx = self.live.subscribe();
        loop {
            {
                let live = rx.borrow_and_update();
                if live.is_empty() {
                    return;
                }
                let beacons: Vec<&Beacon> = live.values().collect();
                info!(
                    live_beacons = live.len(),
                    beacons = %serde_json::to_string(&beacons).unwrap_or_default(),
                    "program termination is on hold because there are live beacons"
                );
            }
            // The sender lives in `self`, so the channel cannot close here
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for BeaconRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Release capability for a single beacon
///
/// Dropping the handle without calling `release()` also releases the beacon,
/// with a warning. A handle that is leaked keeps shutdown on hold until the
/// shutdown timeout forces termination.
#[must_use = "a beacon holds shutdown on hold until it is released"]
pub struct BeaconHandle {
    id: Uuid,
    registry: BeaconRegistry,
    released: bool,
}

impl BeaconHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Release the beacon.
    ///
    /// The live set is updated and waiters notified before this returns
    /// control; completion is then deferred by at least one scheduling turn
    /// so the drain check runs before the caller continues.
    pub async fn release(mut self) {
        self.released = true;
        self.registry.remove(self.id);
        tokio::task::yield_now().await;
    }
}

impl Drop for BeaconHandle {
    fn drop(&mut self) {
        if !self.released {
            warn!(beacon_id = %self.id, "beacon dropped without release; releasing");
            self.registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for BeaconHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconHandle").field("id", &self.id).finish()
    }
}
