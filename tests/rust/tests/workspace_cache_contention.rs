//! Workspace cache under contention (spec §8 scenario 5): two hub
//! instances writing concurrently both land in the cache, and a stale
//! entry for a dead pid is pruned on the next write by the survivor.

use std::sync::Arc;
use tests::{test_workspace_entry, TestWorkspace};

#[tokio::test]
async fn concurrent_upserts_from_two_processes_both_land() {
    let workspace = TestWorkspace::new();
    let cache_a = Arc::new(workspace.workspace_cache());
    let cache_b = Arc::new(workspace.workspace_cache());

    let cwd = workspace.path().to_path_buf();
    let entry_a = test_workspace_entry(cwd.clone(), std::process::id(), 40123);
    let entry_b = test_workspace_entry(cwd, std::process::id(), 40567);

    let (a, b) = tokio::join!(
        { let cache_a = cache_a.clone(); async move { cache_a.upsert(entry_a).await } },
        { let cache_b = cache_b.clone(); async move { cache_b.upsert(entry_b).await } },
    );
    a.expect("first writer should succeed");
    b.expect("second writer should succeed");

    let entries = cache_a.read().await.unwrap();
    assert!(entries.contains_key(&40123));
    assert!(entries.contains_key(&40567));
}

#[tokio::test]
async fn next_write_prunes_an_entry_left_by_a_killed_process() {
    let workspace = TestWorkspace::new();
    let cache_a = workspace.workspace_cache();
    let cache_b = workspace.workspace_cache();
    let cwd = workspace.path().to_path_buf();

    // A pid that is vanishingly unlikely to be alive on this host: this
    // simulates process 40123 having been killed without a clean exit.
    const DEAD_PID: u32 = 0x7fff_fffe;
    cache_a
        .upsert(test_workspace_entry(cwd.clone(), DEAD_PID, 40123))
        .await
        .unwrap();
    cache_a
        .upsert(test_workspace_entry(cwd, std::process::id(), 40567))
        .await
        .unwrap();

    let before = cache_a.read().await.unwrap();
    assert!(before.contains_key(&40123));
    assert!(before.contains_key(&40567));

    // The survivor's next write prunes the dead entry (spec §4.7).
    cache_b.mutate(|_| {}).await.unwrap();

    let after = cache_b.read().await.unwrap();
    assert!(!after.contains_key(&40123));
    assert!(after.contains_key(&40567));
}
