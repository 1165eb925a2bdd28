//! `ServerConnection` runtime entity (spec §3) and its transport kind.

use super::capability::Capability;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TransportType {
    Stdio,
    StreamableHttp,
    Sse,
}

/// Connection status, strictly advanced by the per-server state machine
/// (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Unauthorized,
    Disabled,
}

/// Server-reported identity, captured once during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Snapshot of a `ServerConnection`'s public state, the shape surfaced by
/// `/api/servers` and `/api/servers/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConnectionView {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub transport_type: Option<TransportType>,
    pub status: ConnectionStatus,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub last_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tools: Vec<Capability>,
    #[serde(default)]
    pub resources: Vec<Capability>,
    #[serde(default)]
    pub resource_templates: Vec<Capability>,
    #[serde(default)]
    pub prompts: Vec<Capability>,
    pub authorization_url: Option<String>,
    pub server_info: Option<ServerInfo>,
    pub config_source: String,
}
