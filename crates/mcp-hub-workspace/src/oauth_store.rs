//! OAuth token storage (spec §3, §5): single-process, single-writer per
//! server name, persisted as a flat JSON file keyed by server name.

use mcp_hub_core::{HubError, OAuthState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

pub struct OAuthStore {
    path: PathBuf,
    /// Guards the single-writer-per-server invariant; the whole file is
    /// rewritten on every mutation, so a single mutex suffices.
    write_lock: Mutex<()>,
}

impl OAuthStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn load_all(&self) -> Result<HashMap<String, OAuthState>, HubError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|err| HubError::workspace(format!("malformed oauth storage: {err}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(HubError::workspace(format!(
                "failed to read oauth storage: {err}"
            ))),
        }
    }

    pub async fn load(&self, server_name: &str) -> Result<Option<OAuthState>, HubError> {
        Ok(self.load_all().await?.remove(server_name))
    }

    pub async fn save(&self, state: OAuthState) -> Result<(), HubError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.load_all().await?;
        all.insert(state.server_name.clone(), state);
        self.write_atomic(&all).await
    }

    pub async fn clear(&self, server_name: &str) -> Result<(), HubError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.load_all().await?;
        all.remove(server_name);
        self.write_atomic(&all).await
    }

    async fn write_atomic(&self, all: &HashMap<String, OAuthState>) -> Result<(), HubError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| HubError::workspace(format!("failed to create oauth storage dir: {err}")))?;
        }
        let json = serde_json::to_string_pretty(all)
            .map_err(|err| HubError::workspace(format!("failed to serialize oauth storage: {err}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|err| HubError::workspace(format!("failed to write oauth storage: {err}")))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|err| HubError::workspace(format!("failed to commit oauth storage: {err}")))?;
        debug!(path = %self.path.display(), servers = all.len(), "wrote oauth storage");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_missing_file_returns_empty() {
        let dir = tempdir().unwrap();
        let store = OAuthStore::new(dir.path().join("oauth-storage.json"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = OAuthStore::new(dir.path().join("oauth-storage.json"));
        store.save(OAuthState::new("github")).await.unwrap();
        let loaded = store.load("github").await.unwrap();
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().server_name, "github");
    }

    #[tokio::test]
    async fn clear_removes_single_server_only() {
        let dir = tempdir().unwrap();
        let store = OAuthStore::new(dir.path().join("oauth-storage.json"));
        store.save(OAuthState::new("github")).await.unwrap();
        store.save(OAuthState::new("linear")).await.unwrap();
        store.clear("github").await.unwrap();
        let all = store.load_all().await.unwrap();
        assert!(!all.contains_key("github"));
        assert!(all.contains_key("linear"));
    }
}
