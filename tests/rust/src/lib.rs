//! Shared fixtures for MCP Hub integration tests.

use mcp_hub_core::{create_shared_event_bus, SharedEventBus, WorkspaceEntry};
use mcp_hub_gateway::oauth::HubOAuthManager;
use mcp_hub_gateway::HubCoordinator;
use mcp_hub_workspace::{OAuthStore, WorkspaceCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A scratch directory that outlives the test, holding a config file and a
/// workspace cache / OAuth store that never collide with another test's.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_config(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.config_path(name);
        std::fs::write(&path, contents).expect("failed to write test config");
        path
    }

    pub fn workspace_cache(&self) -> WorkspaceCache {
        WorkspaceCache::new(self.dir.path().join("workspaces.json"))
    }

    pub fn oauth_store(&self) -> OAuthStore {
        OAuthStore::new(self.dir.path().join("oauth-storage.json"))
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a [`HubCoordinator`] wired to a fresh event bus and an OAuth
/// manager backed by the given workspace's own credential store, the same
/// wiring `mcp-hub-cli`'s `main.rs` does at startup.
pub fn test_coordinator(workspace: &TestWorkspace) -> (Arc<HubCoordinator>, SharedEventBus) {
    let bus = create_shared_event_bus();
    let store = Arc::new(workspace.oauth_store());
    let auth = Arc::new(HubOAuthManager::new(
        store,
        "http://127.0.0.1:0",
        bus.sender(),
    ));
    let coordinator = Arc::new(HubCoordinator::new(auth, bus.clone()));
    (coordinator, bus)
}

pub fn test_workspace_entry(cwd: PathBuf, pid: u32, port: u16) -> WorkspaceEntry {
    WorkspaceEntry::new(cwd, Vec::new(), pid, port)
}

/// A JSONC `mcpServers` block with stdio entries that validate (the
/// `command` doesn't need to exist: these fixtures only exercise the
/// Config Loader's parse/merge/diff path, never a real connect).
pub fn stdio_config(servers: &[(&str, &str)]) -> String {
    let entries: Vec<String> = servers
        .iter()
        .map(|(name, command)| format!("\"{name}\": {{ \"command\": \"{command}\" }}"))
        .collect();
    format!("{{\n  \"mcpServers\": {{\n    {}\n  }}\n}}", entries.join(",\n    "))
}
