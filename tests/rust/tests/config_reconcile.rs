//! Config reconcile scenario (spec §8 scenario 3): start with servers
//! `{A,B}`, rewrite the file to `{B,C}`, and confirm the diff reports
//! exactly `added:[C] removed:[A] unchanged:[B]`.

use mcp_hub_config::ConfigLoader;
use tests::{stdio_config, TestWorkspace};

#[tokio::test]
async fn diff_reflects_added_removed_and_unchanged_servers() {
    let workspace = TestWorkspace::new();
    let config_path = workspace.write_config("mcp.json", &stdio_config(&[("a", "true"), ("b", "true")]));

    let loader = ConfigLoader::new(vec![config_path.clone()]);
    let first = loader.load().await.expect("initial load should succeed");
    assert_eq!(first.servers.keys().cloned().collect::<Vec<_>>(), vec!["a", "b"]);

    workspace.write_config("mcp.json", &stdio_config(&[("b", "true"), ("c", "true")]));
    let second = loader.load().await.expect("second load should succeed");

    let diff = ConfigLoader::diff(&first, &second);
    assert_eq!(diff.added, vec!["c".to_string()]);
    assert_eq!(diff.removed, vec!["a".to_string()]);
    assert!(diff.modified.is_empty());
    assert_eq!(diff.unchanged, vec!["b".to_string()]);
    assert!(diff.is_significant());
}

#[tokio::test]
async fn diff_is_empty_and_insignificant_when_nothing_changes() {
    let workspace = TestWorkspace::new();
    let config_path = workspace.write_config("mcp.json", &stdio_config(&[("a", "true")]));

    let loader = ConfigLoader::new(vec![config_path]);
    let first = loader.load().await.unwrap();
    let second = loader.load().await.unwrap();

    let diff = ConfigLoader::diff(&first, &second);
    assert!(diff.added.is_empty());
    assert!(diff.removed.is_empty());
    assert!(diff.modified.is_empty());
    assert_eq!(diff.unchanged, vec!["a".to_string()]);
    assert!(!diff.is_significant());
}

#[tokio::test]
async fn modifying_a_server_entry_is_reported_as_modified_not_added_and_removed() {
    let workspace = TestWorkspace::new();
    let config_path = workspace.write_config("mcp.json", &stdio_config(&[("a", "true")]));

    let loader = ConfigLoader::new(vec![config_path.clone()]);
    let first = loader.load().await.unwrap();

    workspace.write_config("mcp.json", &stdio_config(&[("a", "false")]));
    let second = loader.load().await.unwrap();

    let diff = ConfigLoader::diff(&first, &second);
    assert!(diff.added.is_empty());
    assert!(diff.removed.is_empty());
    assert_eq!(diff.modified, vec!["a".to_string()]);
}

#[tokio::test]
async fn malformed_jsonc_surfaces_as_config_error() {
    let workspace = TestWorkspace::new();
    let config_path = workspace.write_config("mcp.json", "{ not valid json at all");

    let loader = ConfigLoader::new(vec![config_path]);
    let err = loader.load().await.expect_err("malformed config must error");
    assert!(matches!(err, mcp_hub_core::HubError::Config { .. }));
}
