//! `WorkspaceEntry` — one running hub instance, as recorded in the
//! cross-process Workspace Cache (spec §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceState {
    Active,
    ShuttingDown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub cwd: PathBuf,
    pub config_files: Vec<PathBuf>,
    pub pid: u32,
    pub port: u16,
    pub start_time: DateTime<Utc>,
    pub state: WorkspaceState,
    pub active_connections: u32,
    pub shutdown_started_at: Option<DateTime<Utc>>,
    pub shutdown_delay_ms: Option<u64>,
}

impl WorkspaceEntry {
    pub fn new(cwd: PathBuf, config_files: Vec<PathBuf>, pid: u32, port: u16) -> Self {
        Self {
            cwd,
            config_files,
            pid,
            port,
            start_time: Utc::now(),
            state: WorkspaceState::Active,
            active_connections: 0,
            shutdown_started_at: None,
            shutdown_delay_ms: None,
        }
    }
}
