//! Workspace Cache (spec §4.7): a single JSON file, keyed by port, recording
//! one entry per running hub instance. The only cross-process shared
//! resource in the system; every writer takes [`crate::lock::acquire`].

use crate::lock;
use mcp_hub_core::{HubError, WorkspaceEntry};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct WorkspaceCache {
    path: PathBuf,
}

impl WorkspaceCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    /// Read the cache without the lock. Tolerates a partially written file
    /// (an in-progress atomic rename) by retrying once (spec §5).
    pub async fn read(&self) -> Result<BTreeMap<u16, WorkspaceEntry>, HubError> {
        match self.read_once().await {
            Ok(entries) => Ok(entries),
            Err(_) => self.read_once().await,
        }
    }

    async fn read_once(&self) -> Result<BTreeMap<u16, WorkspaceEntry>, HubError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|err| HubError::workspace(format!("malformed workspace cache: {err}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(HubError::workspace(format!(
                "failed to read workspace cache: {err}"
            ))),
        }
    }

    /// Read-prune-mutate-write-release cycle (spec §4.7 write path).
    pub async fn mutate<F>(&self, mutation: F) -> Result<(), HubError>
    where
        F: FnOnce(&mut BTreeMap<u16, WorkspaceEntry>),
    {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                HubError::workspace(format!("failed to create workspace cache dir: {err}"))
            })?;
        }

        let _lock = lock::acquire(&self.lock_path()).await?;

        let mut entries = self.read_once().await.unwrap_or_default();
        prune_dead(&mut entries);
        mutation(&mut entries);
        self.write_atomic(&entries).await
    }

    async fn write_atomic(&self, entries: &BTreeMap<u16, WorkspaceEntry>) -> Result<(), HubError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|err| HubError::workspace(format!("failed to serialize cache: {err}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|err| HubError::workspace(format!("failed to write workspace cache: {err}")))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|err| HubError::workspace(format!("failed to commit workspace cache: {err}")))?;
        debug!(path = %self.path.display(), entries = entries.len(), "wrote workspace cache");
        Ok(())
    }

    pub async fn upsert(&self, entry: WorkspaceEntry) -> Result<(), HubError> {
        self.mutate(|entries| {
            entries.insert(entry.port, entry);
        })
        .await
    }

    pub async fn remove(&self, port: u16) -> Result<(), HubError> {
        self.mutate(|entries| {
            entries.remove(&port);
        })
        .await
    }
}

/// Remove entries whose recorded `pid` is no longer alive on this host.
fn prune_dead(entries: &mut BTreeMap<u16, WorkspaceEntry>) {
    let dead: Vec<u16> = entries
        .iter()
        .filter(|(_, entry)| !is_process_alive(entry.pid))
        .map(|(port, _)| *port)
        .collect();
    for port in dead {
        warn!(port, "pruning dead workspace cache entry");
        entries.remove(&port);
    }
}

/// `kill(pid, 0)` probes existence without sending a signal.
fn is_process_alive(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn entry(port: u16, pid: u32) -> WorkspaceEntry {
        WorkspaceEntry {
            cwd: PathBuf::from("/tmp/project"),
            config_files: vec![],
            pid,
            port,
            start_time: Utc::now(),
            state: mcp_hub_core::WorkspaceState::Active,
            active_connections: 0,
            shutdown_started_at: None,
            shutdown_delay_ms: None,
        }
    }

    #[tokio::test]
    async fn read_missing_file_returns_empty() {
        let dir = tempdir().unwrap();
        let cache = WorkspaceCache::new(dir.path().join("workspaces.json"));
        let entries = cache.read().await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn upsert_and_read_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = WorkspaceCache::new(dir.path().join("workspaces.json"));
        cache.upsert(entry(37123, std::process::id())).await.unwrap();
        let entries = cache.read().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key(&37123));
    }

    #[tokio::test]
    async fn remove_deletes_entry() {
        let dir = tempdir().unwrap();
        let cache = WorkspaceCache::new(dir.path().join("workspaces.json"));
        cache.upsert(entry(37123, std::process::id())).await.unwrap();
        cache.remove(37123).await.unwrap();
        let entries = cache.read().await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn prunes_entries_with_dead_pid_on_next_mutation() {
        let dir = tempdir().unwrap();
        let cache = WorkspaceCache::new(dir.path().join("workspaces.json"));
        cache.upsert(entry(1, std::process::id())).await.unwrap();
        // Bypass the normal write path to seed a dead entry directly, since
        // `mutate` itself would prune it away as it inserts.
        let mut seeded = cache.read().await.unwrap();
        seeded.insert(2, entry(2, 999_999));
        cache.write_atomic(&seeded).await.unwrap();

        // The next mutation's read-prune-mutate cycle removes the dead entry.
        cache.upsert(entry(3, std::process::id())).await.unwrap();
        let entries = cache.read().await.unwrap();
        assert!(entries.contains_key(&1));
        assert!(entries.contains_key(&3));
        assert!(!entries.contains_key(&2));
    }
}
