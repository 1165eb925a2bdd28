//! `HubEvent` — the unified set of events broadcast on the Event Bus
//! (spec §4.5). Every event carries an ISO-8601 timestamp via its envelope.

use crate::domain::{Capability, HubState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A config-diff payload, shared by `config_changed` and the
/// `servers_updating`/`servers_updated` pair (spec §4.2, §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ConfigDelta {
    pub fn is_significant(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.modified.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub level: LogLevel,
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// All events the bus can carry. Every variant is wrapped in
/// [`HubEventEnvelope`] before being broadcast, which attaches the
/// timestamp (spec §4.5 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    Heartbeat { connections: usize },
    HubStateChanged { state: HubState },
    Log(LogPayload),
    ConfigChanged { delta: ConfigDelta },
    ServersUpdating { delta: ConfigDelta },
    ServersUpdated { delta: ConfigDelta },
    ToolListChanged { server_name: String, tools: Vec<Capability> },
    ResourceListChanged { server_name: String, resources: Vec<Capability> },
    PromptListChanged { server_name: String, prompts: Vec<Capability> },
    WorkspacesUpdated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEventEnvelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: HubEvent,
}

impl HubEventEnvelope {
    pub fn new(event: HubEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Builds a standard log event; a small convenience used by every crate
/// that wants to put something on the `log` stream without constructing
/// the payload by hand.
pub fn log_event(level: LogLevel, code: &str, message: impl Into<String>) -> HubEvent {
    HubEvent::Log(LogPayload {
        level,
        code: code.to_string(),
        message: message.into(),
        data: serde_json::json!({}),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_significance() {
        let empty = ConfigDelta::default();
        assert!(!empty.is_significant());

        let changed = ConfigDelta {
            added: vec!["a".into()],
            ..Default::default()
        };
        assert!(changed.is_significant());
    }

    #[test]
    fn envelope_carries_timestamp() {
        let env = HubEventEnvelope::new(HubEvent::WorkspacesUpdated);
        assert!(env.timestamp <= Utc::now());
    }
}
