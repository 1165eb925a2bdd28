//! Idle auto-shutdown (spec §8 scenario 6): the last SSE subscriber
//! disconnecting starts a `shutdownDelay` timer; a re-subscribe before it
//! fires cancels it, otherwise the hub transitions `ready -> stopping ->
//! stopped` and the process-level cancellation token fires.

use mcp_hub_core::{HubState, WorkspaceState};
use mcp_hub_gateway::http::ConnectionTracker;
use std::sync::Arc;
use std::time::Duration;
use tests::{test_coordinator, test_workspace_entry, TestWorkspace};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn resubscribing_before_the_delay_cancels_the_shutdown() {
    let workspace = TestWorkspace::new();
    let (coordinator, _bus) = test_coordinator(&workspace);
    coordinator.initialize(Vec::new(), false).await.unwrap();

    let cache = Arc::new(workspace.workspace_cache());
    cache
        .upsert(test_workspace_entry(workspace.path().to_path_buf(), std::process::id(), 41000))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let tracker = ConnectionTracker::new(true, 50, 41000, cache.clone(), coordinator.clone(), shutdown.clone());

    tracker.on_connect().await;
    tracker.on_disconnect().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    tracker.on_connect().await;

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(!shutdown.is_cancelled());
    assert_eq!(coordinator.hub_state().await, HubState::Ready);

    let entries = cache.read().await.unwrap();
    let entry = entries.get(&41000).expect("entry should still be present");
    assert_eq!(entry.state, WorkspaceState::Active);
    assert_eq!(entry.active_connections, 1);
}

#[tokio::test]
async fn staying_idle_past_the_delay_stops_the_hub_and_removes_the_entry() {
    let workspace = TestWorkspace::new();
    let (coordinator, _bus) = test_coordinator(&workspace);
    coordinator.initialize(Vec::new(), false).await.unwrap();

    let cache = Arc::new(workspace.workspace_cache());
    cache
        .upsert(test_workspace_entry(workspace.path().to_path_buf(), std::process::id(), 41001))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let tracker = ConnectionTracker::new(true, 50, 41001, cache.clone(), coordinator.clone(), shutdown.clone());

    tracker.on_connect().await;
    tracker.on_disconnect().await;

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(shutdown.is_cancelled());
    assert_eq!(coordinator.hub_state().await, HubState::Stopped);

    let entries = cache.read().await.unwrap();
    assert!(!entries.contains_key(&41001));
}

#[tokio::test]
async fn disabled_auto_shutdown_never_starts_a_timer() {
    let workspace = TestWorkspace::new();
    let (coordinator, _bus) = test_coordinator(&workspace);
    coordinator.initialize(Vec::new(), false).await.unwrap();

    let cache = Arc::new(workspace.workspace_cache());
    cache
        .upsert(test_workspace_entry(workspace.path().to_path_buf(), std::process::id(), 41002))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let tracker = ConnectionTracker::new(false, 50, 41002, cache.clone(), coordinator.clone(), shutdown.clone());

    tracker.on_connect().await;
    tracker.on_disconnect().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!shutdown.is_cancelled());
    assert_eq!(coordinator.hub_state().await, HubState::Ready);
}
