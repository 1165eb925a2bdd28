//! Platform directory resolution (spec §6 "Persisted state").
//!
//! Prefers the OS-conventional XDG/AppData locations via [`dirs`], falling
//! back to the legacy `~/.mcp-hub` layout when the XDG dirs can't be
//! determined (e.g. `HOME` unset in a minimal container).

use std::path::PathBuf;

const APP_DIR: &str = "mcp-hub";

fn legacy_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".mcp-hub"))
}

/// Directory for logs, the workspace cache, and lock files.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join(APP_DIR))
        .or_else(legacy_root)
        .unwrap_or_else(|| PathBuf::from(".mcp-hub"))
}

/// Directory for OAuth token storage and other durable, user-scoped data.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .or_else(legacy_root)
        .unwrap_or_else(|| PathBuf::from(".mcp-hub"))
}

/// Directory for ephemeral, safely-discardable data.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR))
        .or_else(legacy_root)
        .unwrap_or_else(|| PathBuf::from(".mcp-hub"))
}

pub fn logs_dir() -> PathBuf {
    state_dir().join("logs")
}

pub fn oauth_storage_path() -> PathBuf {
    data_dir().join("oauth-storage.json")
}

/// The single shared cache file every hub instance on this machine reads,
/// prunes, and writes under the same advisory lock (spec §3, §4.7) — not
/// keyed by port, since cross-process discovery is the entire point.
pub fn workspace_cache_path() -> PathBuf {
    state_dir().join("workspaces.json")
}
