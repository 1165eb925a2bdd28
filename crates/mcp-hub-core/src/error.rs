//! Error taxonomy (spec §7). Every variant carries a stable `code()`, maps
//! to an HTTP status for the Management API's error envelope, and never
//! aborts anything beyond the operation that raised it.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("config error: {message}")]
    Config {
        message: String,
        data: serde_json::Value,
    },
    #[error("connection error: {message}")]
    Connection {
        message: String,
        data: serde_json::Value,
    },
    #[error("authorization required: {message}")]
    Auth {
        message: String,
        data: serde_json::Value,
    },
    #[error("server error: {message}")]
    Server {
        message: String,
        data: serde_json::Value,
    },
    #[error("tool error: {message}")]
    Tool {
        message: String,
        data: serde_json::Value,
    },
    #[error("resource error: {message}")]
    Resource {
        message: String,
        data: serde_json::Value,
    },
    #[error("prompt error: {message}")]
    Prompt {
        message: String,
        data: serde_json::Value,
    },
    #[error("validation error: {message}")]
    Validation {
        message: String,
        data: serde_json::Value,
    },
    #[error("workspace error: {message}")]
    Workspace {
        message: String,
        data: serde_json::Value,
    },
}

impl HubError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn config_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Config {
            message: message.into(),
            data,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn auth(message: impl Into<String>, authorization_url: Option<&str>) -> Self {
        Self::Auth {
            message: message.into(),
            data: serde_json::json!({ "authorization_url": authorization_url }),
        }
    }

    pub fn server_not_found(name: &str) -> Self {
        Self::Server {
            message: format!("unknown server: {name}"),
            data: serde_json::json!({ "server_name": name }),
        }
    }

    pub fn server_not_connected(name: &str) -> Self {
        Self::Server {
            message: format!("server not connected: {name}"),
            data: serde_json::json!({ "server_name": name }),
        }
    }

    pub fn tool(server_name: &str, tool: &str, message: impl Into<String>) -> Self {
        Self::Tool {
            message: message.into(),
            data: serde_json::json!({ "server_name": server_name, "tool": tool }),
        }
    }

    pub fn resource(server_name: &str, uri: &str, message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
            data: serde_json::json!({ "server_name": server_name, "uri": uri }),
        }
    }

    pub fn prompt(server_name: &str, prompt: &str, message: impl Into<String>) -> Self {
        Self::Prompt {
            message: message.into(),
            data: serde_json::json!({ "server_name": server_name, "prompt": prompt }),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn workspace(message: impl Into<String>) -> Self {
        Self::Workspace {
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Stable machine-readable code, independent of the display message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config_error",
            Self::Connection { .. } => "connection_error",
            Self::Auth { .. } => "auth_error",
            Self::Server { .. } => "server_error",
            Self::Tool { .. } => "tool_error",
            Self::Resource { .. } => "resource_error",
            Self::Prompt { .. } => "prompt_error",
            Self::Validation { .. } => "validation_error",
            Self::Workspace { .. } => "workspace_error",
        }
    }

    /// HTTP status per spec §6: 400 validation, 404 not-found, 503
    /// known-but-not-connected, 500 otherwise.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Server { message, .. } if message.contains("unknown server") => 404,
            Self::Server { message, .. } if message.contains("not connected") => 503,
            Self::Auth { .. } => 401,
            _ => 500,
        }
    }

    fn data(&self) -> &serde_json::Value {
        match self {
            Self::Config { data, .. }
            | Self::Connection { data, .. }
            | Self::Auth { data, .. }
            | Self::Server { data, .. }
            | Self::Tool { data, .. }
            | Self::Resource { data, .. }
            | Self::Prompt { data, .. }
            | Self::Validation { data, .. }
            | Self::Workspace { data, .. } => data,
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.code().to_string(),
            message: self.to_string(),
            data: self.data().clone(),
            timestamp: Utc::now(),
        }
    }
}

/// The JSON body returned for every failed Management API request
/// (spec §6: `{code, message, data, timestamp}`).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
