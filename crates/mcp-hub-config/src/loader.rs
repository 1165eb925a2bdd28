//! Config Loader (spec §4.2).
//!
//! Reads an ordered list of JSONC config files, merges them into a single
//! `mcpServers` mapping (later files win per server name), validates each
//! entry, and diffs successive loads by deep equality.

use mcp_hub_core::{HubError, RawServerEntry, ServerConfig};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The merged, validated result of one load pass.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub servers: BTreeMap<String, ServerConfig>,
    pub raw: BTreeMap<String, RawServerEntry>,
}

/// Four-way diff between two successive loads, identity by deep equality
/// of the post-merge raw server entry (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
}

impl Diff {
    pub fn is_significant(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.modified.is_empty()
    }
}

pub struct ConfigLoader {
    paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Read and merge all configured files, validating each server entry.
    /// Missing files are skipped silently; malformed JSONC in a present file
    /// is a config error.
    pub async fn load(&self) -> Result<LoadedConfig, HubError> {
        let mut merged_raw: BTreeMap<String, (Value, PathBuf)> = BTreeMap::new();
        let mut other_top_level: Map<String, Value> = Map::new();

        for path in &self.paths {
            let text = match tokio::fs::read_to_string(path).await {
                Ok(text) => text,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "config file missing, skipping");
                    continue;
                }
                Err(err) => {
                    return Err(HubError::config(format!(
                        "failed to read {}: {err}",
                        path.display()
                    )))
                }
            };

            let parsed = jsonc_parser::parse_to_serde_value(&text, &Default::default())
                .map_err(|err| {
                    HubError::config(format!("invalid JSONC in {}: {err}", path.display()))
                })?
                .ok_or_else(|| HubError::config(format!("empty config file {}", path.display())))?;

            let Value::Object(mut top) = parsed else {
                return Err(HubError::config(format!(
                    "{} must contain a JSON object",
                    path.display()
                )));
            };

            let servers_key = if top.contains_key("mcpServers") {
                "mcpServers"
            } else {
                "servers"
            };
            if let Some(Value::Object(servers)) = top.remove(servers_key) {
                for (name, entry) in servers {
                    merged_raw.insert(name, (entry, path.clone()));
                }
            }

            // Remaining top-level keys are fully replaced by the last file
            // that contains them.
            for (key, value) in top {
                other_top_level.insert(key, value);
            }
        }

        let mut servers = BTreeMap::new();
        let mut raw = BTreeMap::new();
        for (name, (value, source)) in merged_raw {
            let entry: RawServerEntry = serde_json::from_value(value).map_err(|err| {
                HubError::validation(format!("server `{name}` has an invalid shape: {err}"))
            })?;
            let config = ServerConfig::from_raw(name.clone(), entry.clone(), source)
                .map_err(|err| HubError::validation(format!("server `{name}`: {err}")))?;
            servers.insert(name.clone(), config);
            raw.insert(name, entry);
        }

        let _ = other_top_level; // reserved: unrecognized top-level keys are intentionally ignored downstream

        Ok(LoadedConfig { servers, raw })
    }

    /// Diff two loads by deep equality of the raw (pre-validation, but
    /// post-merge) server entry.
    pub fn diff(previous: &LoadedConfig, next: &LoadedConfig) -> Diff {
        let mut diff = Diff::default();

        for name in next.raw.keys() {
            if !previous.raw.contains_key(name) {
                diff.added.push(name.clone());
            }
        }
        for name in previous.raw.keys() {
            if !next.raw.contains_key(name) {
                diff.removed.push(name.clone());
            }
        }
        for (name, next_entry) in &next.raw {
            if let Some(prev_entry) = previous.raw.get(name) {
                let prev_json = serde_json::to_value(prev_entry).unwrap_or(Value::Null);
                let next_json = serde_json::to_value(next_entry).unwrap_or(Value::Null);
                if prev_json == next_json {
                    diff.unchanged.push(name.clone());
                } else {
                    diff.modified.push(name.clone());
                }
            }
        }

        diff.added.sort();
        diff.removed.sort();
        diff.modified.sort();
        diff.unchanged.sort();
        diff
    }
}

/// Resolve a config path's parent directory, used as `${workspaceFolder}`
/// when no explicit workspace root is given.
pub fn infer_workspace_folder(first_config_path: Option<&Path>) -> PathBuf {
    first_config_path
        .and_then(|p| p.parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|err| {
                warn!(%err, "failed to determine current directory, defaulting to `.`");
                PathBuf::from(".")
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    async fn write(path: &Path, contents: &str) {
        let mut file = tokio::fs::File::create(path).await.unwrap();
        file.write_all(contents.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_skipped_silently() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.jsonc");
        let loader = ConfigLoader::new(vec![path]);
        let loaded = loader.load().await.unwrap();
        assert!(loaded.servers.is_empty());
    }

    #[tokio::test]
    async fn merges_servers_root_key_alias() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jsonc");
        write(
            &path,
            r#"{ "servers": { "fs": { "command": "node", "args": ["server.js"] } } }"#,
        )
        .await;
        let loader = ConfigLoader::new(vec![path]);
        let loaded = loader.load().await.unwrap();
        assert!(loaded.servers.contains_key("fs"));
    }

    #[tokio::test]
    async fn later_file_overrides_earlier_entry() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jsonc");
        let b = dir.path().join("b.jsonc");
        write(
            &a,
            r#"{ "mcpServers": { "fs": { "command": "node-v1" } } }"#,
        )
        .await;
        write(
            &b,
            r#"{ "mcpServers": { "fs": { "command": "node-v2" } } }"#,
        )
        .await;
        let loader = ConfigLoader::new(vec![a, b]);
        let loaded = loader.load().await.unwrap();
        let entry = loaded.raw.get("fs").unwrap();
        assert_eq!(entry.command.as_deref(), Some("node-v2"));
    }

    #[tokio::test]
    async fn tolerates_comments_and_trailing_commas() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jsonc");
        write(
            &path,
            r#"{
                // comment
                "mcpServers": {
                    "fs": { "command": "node", "args": ["server.js"], },
                },
            }"#,
        )
        .await;
        let loader = ConfigLoader::new(vec![path]);
        let loaded = loader.load().await.unwrap();
        assert!(loaded.servers.contains_key("fs"));
    }

    #[tokio::test]
    async fn rejects_ambiguous_transport() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jsonc");
        write(
            &path,
            r#"{ "mcpServers": { "bad": { "command": "node", "url": "http://x" } } }"#,
        )
        .await;
        let loader = ConfigLoader::new(vec![path]);
        assert!(loader.load().await.is_err());
    }

    #[test]
    fn diff_classifies_added_removed_modified_unchanged() {
        let mut previous = LoadedConfig::default();
        let mut next = LoadedConfig::default();

        let entry_a = RawServerEntry {
            command: Some("node".into()),
            ..Default::default()
        };
        let entry_b = RawServerEntry {
            command: Some("python".into()),
            ..Default::default()
        };
        let entry_b_modified = RawServerEntry {
            command: Some("python3".into()),
            ..Default::default()
        };
        let entry_c = RawServerEntry {
            command: Some("ruby".into()),
            ..Default::default()
        };

        previous.raw.insert("a".into(), entry_a.clone());
        previous.raw.insert("b".into(), entry_b);
        next.raw.insert("a".into(), entry_a);
        next.raw.insert("b".into(), entry_b_modified);
        next.raw.insert("c".into(), entry_c);

        let diff = ConfigLoader::diff(&previous, &next);
        assert_eq!(diff.added, vec!["c".to_string()]);
        assert_eq!(diff.removed, Vec::<String>::new());
        assert_eq!(diff.modified, vec!["b".to_string()]);
        assert_eq!(diff.unchanged, vec!["a".to_string()]);
        assert!(diff.is_significant());
    }
}
