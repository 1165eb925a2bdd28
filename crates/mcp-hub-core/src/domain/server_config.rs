//! `ServerConfig` — the declarative description of one upstream server (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Raw, pre-validation server entry as it appears in a config file under
/// `mcpServers`/`servers`. Exactly one of `command`/`url` must be present;
/// this is enforced by [`ServerConfig::from_raw`], not by serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawServerEntry {
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, Option<String>>,
    pub cwd: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
    pub dev: Option<DevConfig>,
    pub name: Option<String>,
}

/// Dev-mode watcher configuration. Stdio-only; `cwd` must be absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub watch: Vec<String>,
    pub cwd: PathBuf,
}

/// Validated, post-merge server configuration — the unit the Hub Coordinator
/// reconciles against. `transport` discriminates stdio vs. remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportConfig,
    #[serde(default)]
    pub disabled: bool,
    pub display_name: Option<String>,
    /// Path of the config file this entry was last merged from.
    pub config_source: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, Option<String>>,
        cwd: Option<String>,
        dev: Option<DevConfig>,
    },
    Remote {
        url: String,
        headers: HashMap<String, String>,
    },
}

impl TransportConfig {
    pub fn is_stdio(&self) -> bool {
        matches!(self, TransportConfig::Stdio { .. })
    }
}

/// Errors raised while validating a [`RawServerEntry`] into a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ServerConfigError {
    #[error("server must have exactly one of `command` or `url`")]
    AmbiguousTransport,
    #[error("`dev` is only valid on stdio servers")]
    DevOnRemote,
    #[error("`dev.cwd` must be an absolute path, got `{0}`")]
    DevCwdNotAbsolute(String),
}

impl ServerConfig {
    /// Validate a raw entry per spec §3/§4.2: exactly one of command/url,
    /// `dev` forbidden on remote servers, `dev.cwd` absolute when present.
    pub fn from_raw(
        name: String,
        raw: RawServerEntry,
        config_source: PathBuf,
    ) -> Result<Self, ServerConfigError> {
        let has_command = raw.command.is_some();
        let has_url = raw.url.is_some();
        if has_command == has_url {
            return Err(ServerConfigError::AmbiguousTransport);
        }

        if has_url {
            if raw.dev.is_some() {
                return Err(ServerConfigError::DevOnRemote);
            }
            return Ok(Self {
                name,
                display_name: raw.name,
                disabled: raw.disabled,
                config_source,
                transport: TransportConfig::Remote {
                    url: raw.url.unwrap(),
                    headers: raw.headers,
                },
            });
        }

        if let Some(dev) = &raw.dev {
            if !dev.cwd.is_absolute() {
                return Err(ServerConfigError::DevCwdNotAbsolute(
                    dev.cwd.display().to_string(),
                ));
            }
        }

        Ok(Self {
            name,
            display_name: raw.name,
            disabled: raw.disabled,
            config_source,
            transport: TransportConfig::Stdio {
                command: raw.command.unwrap(),
                args: raw.args,
                env: raw.env,
                cwd: raw.cwd,
                dev: raw.dev,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_stdio() -> RawServerEntry {
        RawServerEntry {
            command: Some("node".into()),
            args: vec!["server.js".into()],
            ..Default::default()
        }
    }

    #[test]
    fn rejects_both_command_and_url() {
        let mut raw = raw_stdio();
        raw.url = Some("http://localhost".into());
        let err = ServerConfig::from_raw("x".into(), raw, "a.json".into()).unwrap_err();
        assert!(matches!(err, ServerConfigError::AmbiguousTransport));
    }

    #[test]
    fn rejects_neither_command_nor_url() {
        let raw = RawServerEntry::default();
        let err = ServerConfig::from_raw("x".into(), raw, "a.json".into()).unwrap_err();
        assert!(matches!(err, ServerConfigError::AmbiguousTransport));
    }

    #[test]
    fn rejects_dev_on_remote() {
        let raw = RawServerEntry {
            url: Some("http://localhost".into()),
            dev: Some(DevConfig {
                enabled: true,
                watch: vec![],
                cwd: "/tmp".into(),
            }),
            ..Default::default()
        };
        let err = ServerConfig::from_raw("x".into(), raw, "a.json".into()).unwrap_err();
        assert!(matches!(err, ServerConfigError::DevOnRemote));
    }

    #[test]
    fn rejects_relative_dev_cwd() {
        let mut raw = raw_stdio();
        raw.dev = Some(DevConfig {
            enabled: true,
            watch: vec!["**/*.js".into()],
            cwd: "relative/path".into(),
        });
        let err = ServerConfig::from_raw("x".into(), raw, "a.json".into()).unwrap_err();
        assert!(matches!(err, ServerConfigError::DevCwdNotAbsolute(_)));
    }

    #[test]
    fn accepts_valid_stdio() {
        let cfg = ServerConfig::from_raw("echo".into(), raw_stdio(), "a.json".into()).unwrap();
        assert_eq!(cfg.name, "echo");
        assert!(cfg.transport.is_stdio());
    }
}
