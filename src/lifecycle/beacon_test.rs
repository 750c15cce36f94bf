//! Tests for the beacon registry

use super::beacon::*;
use super::clock::ManualClock;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_registry_initially_empty() {
    let registry = BeaconRegistry::new();

    assert!(registry.is_empty());
    assert_eq!(registry.len(), 0);
    assert!(registry.snapshot().is_empty());
}

#[tokio::test]
async fn test_create_and_release_beacon() {
    let registry = BeaconRegistry::new();

    let beacon = registry.create_beacon(json!({ "job": "export" }));
    assert!(!registry.is_empty());
    assert_eq!(registry.len(), 1);

    beacon.release().await;
    assert!(registry.is_empty());
}

#[test]
fn test_context_normalization() {
    let registry = BeaconRegistry::new();

    let _object = registry.create_beacon(json!({ "job": "export" }));
    let _null = registry.create_beacon(serde_json::Value::Null);
    let _scalar = registry.create_beacon(json!("upload"));

    let contexts: Vec<_> = registry.snapshot().into_iter().map(|b| b.context).collect();
    assert!(contexts.iter().any(|c| c.get("job") == Some(&json!("export"))));
    assert!(contexts.iter().any(|c| c.is_empty()));
    assert!(contexts.iter().any(|c| c.get("value") == Some(&json!("upload"))));
}

#[test]
fn test_snapshot_is_oldest_first() {
    let clock = Arc::new(ManualClock::starting_at(Utc::now()));
    let registry = BeaconRegistry::with_clock(clock.clone());

    let first = registry.create_beacon(json!({ "n": 1 }));
    clock.advance(chrono::Duration::seconds(5));
    let second = registry.create_beacon(json!({ "n": 2 }));

    let ids: Vec<_> = registry.snapshot().into_iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![first.id(), second.id()]);
}

/// Dropping a handle without release still removes the beacon
#[test]
fn test_dropped_handle_releases_beacon() {
    let registry = BeaconRegistry::new();

    let beacon = registry.create_beacon(json!({}));
    assert_eq!(registry.len(), 1);

    drop(beacon);
    assert!(registry.is_empty());
}

/// Already empty: the wait resolves without any change notification
#[tokio::test]
async fn test_wait_until_empty_resolves_immediately_when_empty() {
    let registry = BeaconRegistry::new();

    let result = tokio::time::timeout(Duration::from_millis(100), registry.wait_until_empty()).await;

    assert!(result.is_ok(), "wait should resolve when no beacons are live");
}

/// The wait resolves only after the last of several beacons is released
#[tokio::test]
async fn test_wait_until_empty_waits_for_last_release() {
    let registry = BeaconRegistry::new();
    let a = registry.create_beacon(json!({ "name": "a" }));
    let b = registry.create_beacon(json!({ "name": "b" }));

    let waiter = registry.clone();
    let handle = tokio::spawn(async move { waiter.wait_until_empty().await });

    a.release().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished(), "wait must not resolve after the first release");

    b.release().await;
    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(result.is_ok(), "wait should resolve after the last release");
}

/// A beacon created while another is released keeps the set non-empty
#[tokio::test]
async fn test_create_during_release_is_not_a_false_empty() {
    let registry = BeaconRegistry::new();
    let a = registry.create_beacon(json!({ "name": "a" }));

    let waiter = registry.clone();
    let handle = tokio::spawn(async move { waiter.wait_until_empty().await });

    let late = registry.create_beacon(json!({ "name": "late" }));
    a.release().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished(), "late beacon is still live");

    late.release().await;
    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(result.is_ok());
}

/// Registry clones share the live set
#[tokio::test]
async fn test_registry_clones_share_state() {
    let registry = BeaconRegistry::new();
    let cloned = registry.clone();

    let beacon = cloned.create_beacon(json!({}));
    assert_eq!(registry.len(), 1);

    beacon.release().await;
    assert!(registry.is_empty());
}

/// `release()` hands the scheduler a turn before it completes, so a parked
/// drain waiter has already observed the empty set when the caller resumes
#[tokio::test(flavor = "current_thread")]
async fn test_release_yields_to_drain_waiter() {
    let registry = BeaconRegistry::new();
    let beacon = registry.create_beacon(json!({ "job": "flush" }));

    let waiter = registry.clone();
    let handle = tokio::spawn(async move { waiter.wait_until_empty().await });

    // Let the waiter subscribe and park on the change notification
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert!(!handle.is_finished());

    beacon.release().await;

    assert!(
        handle.is_finished(),
        "waiter should have run during the release yield"
    );
}
