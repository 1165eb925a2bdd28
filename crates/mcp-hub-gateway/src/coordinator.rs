//! Hub Coordinator (spec §4.4): owns the server-name → connection map,
//! drives the Placeholder Resolver ahead of every connect, reconciles
//! config changes, and advances [`HubState`].

use crate::oauth::HubOAuthManager;
use futures::future::join_all;
use mcp_hub_config::{ConfigLoader, Diff, LoadedConfig, ResolutionContext, Resolver};
use mcp_hub_core::{
    ConnectionStatus, HubError, HubEvent, HubState, ServerConfig, ServerConnectionView,
    TransportConfig,
};
use mcp_hub_core::{EventReceiver, EventSender, SharedEventBus};
use mcp_hub_mcp::{AuthProvider, ServerConnection};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct HubCoordinator {
    connections: RwLock<BTreeMap<String, Arc<ServerConnection>>>,
    config_paths: RwLock<Vec<PathBuf>>,
    previous_config: RwLock<LoadedConfig>,
    auth: Arc<HubOAuthManager>,
    bus: SharedEventBus,
    events: EventSender,
    hub_state: RwLock<HubState>,
}

impl HubCoordinator {
    pub fn new(auth: Arc<HubOAuthManager>, bus: SharedEventBus) -> Self {
        let events = bus.sender();
        Self {
            connections: RwLock::new(BTreeMap::new()),
            config_paths: RwLock::new(Vec::new()),
            previous_config: RwLock::new(LoadedConfig::default()),
            auth,
            bus,
            events,
            hub_state: RwLock::new(HubState::Starting),
        }
    }

    pub async fn hub_state(&self) -> HubState {
        *self.hub_state.read().await
    }

    async fn transition(&self, next: HubState) {
        let mut state = self.hub_state.write().await;
        debug_assert!(
            state.can_transition_to(next),
            "illegal hub state transition {state:?} -> {next:?}"
        );
        *state = next;
        drop(state);
        self.events.emit(HubEvent::HubStateChanged { state: next });
    }

    /// Load config, connect every non-disabled server in parallel, and
    /// (if `watch_enabled`) start watching the config files for further
    /// changes (spec §4.4 `initialize`).
    pub async fn initialize(
        self: &Arc<Self>,
        paths: Vec<PathBuf>,
        watch_enabled: bool,
    ) -> Result<(), HubError> {
        let loader = ConfigLoader::new(paths.clone());
        let loaded = loader.load().await?;

        {
            let mut connections = self.connections.write().await;
            for (name, config) in &loaded.servers {
                let connection = ServerConnection::new(
                    config.clone(),
                    self.events.clone(),
                    self.auth.clone() as Arc<dyn AuthProvider>,
                );
                connections.insert(name.clone(), connection);
            }
        }

        self.connect_all().await;

        *self.previous_config.write().await = loaded;
        *self.config_paths.write().await = paths;

        if watch_enabled {
            self.spawn_watch().await?;
        }

        self.transition(HubState::Ready).await;
        Ok(())
    }

    async fn spawn_watch(self: &Arc<Self>) -> Result<(), HubError> {
        let paths = self.config_paths.read().await.clone();
        let loader = ConfigLoader::new(paths);
        let previous = self.previous_config.read().await.clone();
        let mut rx = mcp_hub_config::watch(loader, previous).await?;

        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                coordinator.events.emit(HubEvent::ConfigChanged {
                    delta: to_config_delta(&event.diff),
                });
                if event.diff.is_significant() {
                    coordinator.apply_delta(&event.loaded, &event.diff).await;
                }
                *coordinator.previous_config.write().await = event.loaded;
            }
            debug!("config watcher channel closed");
        });
        Ok(())
    }

    async fn connect_all(&self) {
        let connections: Vec<_> = self.connections.read().await.values().cloned().collect();
        connect_each(&connections).await;
    }

    /// Apply a config diff (spec §4.4 `applyDelta`): added servers are
    /// created and connected, removed servers are disconnected and
    /// dropped, modified servers are reconnected with their new config.
    /// Every server is attempted independently; one failure never aborts
    /// the batch.
    pub async fn apply_delta(&self, loaded: &LoadedConfig, diff: &Diff) {
        let delta = to_config_delta(diff);
        self.events.emit(HubEvent::ServersUpdating { delta: delta.clone() });

        for name in &diff.removed {
            if let Some(connection) = self.connections.write().await.remove(name) {
                connection.disconnect().await;
            }
        }

        let mut to_connect = Vec::new();
        for name in diff.added.iter().chain(diff.modified.iter()) {
            let Some(config) = loaded.servers.get(name) else {
                continue;
            };
            let mut connections = self.connections.write().await;
            match connections.get(name) {
                Some(existing) => existing.set_config(config.clone()).await,
                None => {
                    let connection = ServerConnection::new(
                        config.clone(),
                        self.events.clone(),
                        self.auth.clone() as Arc<dyn AuthProvider>,
                    );
                    connections.insert(name.clone(), connection);
                }
            }
            to_connect.push(connections.get(name).unwrap().clone());
        }

        connect_each(&to_connect).await;

        self.events.emit(HubEvent::ServersUpdated { delta });
    }

    pub async fn start_server(&self, name: &str) -> Result<(), HubError> {
        let connection = self.get(name).await?;
        let mut config = connection.config().await;
        config.disabled = false;
        connection.set_config(config).await;
        resolve_and_connect(&connection).await
    }

    pub async fn stop_server(&self, name: &str, disable: bool) -> Result<(), HubError> {
        let connection = self.get(name).await?;
        connection.disconnect().await;
        if disable {
            let mut config = connection.config().await;
            config.disabled = true;
            connection.set_config(config).await;
        }
        Ok(())
    }

    /// Re-fetch a connected server's capabilities, or, if it's sitting in
    /// `unauthorized` (e.g. right after an OAuth callback completes),
    /// actually connect it for the first time (spec §4.4, §8 scenario 4).
    pub async fn refresh_server(&self, name: &str) -> Result<(), HubError> {
        let connection = self.get(name).await?;
        if connection.status().await == ConnectionStatus::Unauthorized {
            resolve_and_connect(&connection).await?;
            self.events.emit(HubEvent::ServersUpdated {
                delta: mcp_hub_core::ConfigDelta {
                    modified: vec![name.to_string()],
                    ..Default::default()
                },
            });
            return Ok(());
        }
        connection.refresh().await;
        Ok(())
    }

    pub async fn refresh_all(&self) {
        let connections: Vec<_> = self.connections.read().await.values().cloned().collect();
        join_all(connections.iter().map(|conn| conn.refresh())).await;
    }

    pub async fn call_tool(
        &self,
        server_name: &str,
        tool: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<rmcp::model::CallToolResult, HubError> {
        self.get(server_name).await?.call_tool(tool, arguments).await
    }

    pub async fn read_resource(
        &self,
        server_name: &str,
        uri: &str,
    ) -> Result<rmcp::model::ReadResourceResult, HubError> {
        self.get(server_name).await?.read_resource(uri).await
    }

    pub async fn get_prompt(
        &self,
        server_name: &str,
        prompt: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<rmcp::model::GetPromptResult, HubError> {
        self.get(server_name).await?.get_prompt(prompt, arguments).await
    }

    /// Re-load config and reconcile without tearing down SSE clients or the
    /// HTTP listener (spec §4.4 `restart`).
    pub async fn restart(&self) -> Result<(), HubError> {
        self.transition(HubState::Restarting).await;
        let paths = self.config_paths.read().await.clone();
        if paths.is_empty() {
            return Err(HubError::config("hub not initialized"));
        }
        let loader = ConfigLoader::new(paths);
        let loaded = loader.load().await?;
        let previous = self.previous_config.read().await.clone();
        let diff = ConfigLoader::diff(&previous, &loaded);
        self.apply_delta(&loaded, &diff).await;
        *self.previous_config.write().await = loaded;
        self.transition(HubState::Restarted).await;
        self.transition(HubState::Ready).await;
        Ok(())
    }

    /// The upstream URL for a remote server, needed to start an OAuth flow
    /// (spec §6 `/api/servers/authorize`). Stdio servers have none.
    pub async fn server_url(&self, name: &str) -> Result<String, HubError> {
        let connection = self.get(name).await?;
        match connection.config().await.transport {
            TransportConfig::Remote { url, .. } => Ok(url),
            TransportConfig::Stdio { .. } => Err(HubError::validation(format!(
                "'{name}' is a stdio server; OAuth only applies to remote transports"
            ))),
        }
    }

    pub async fn view(&self, name: &str) -> Result<ServerConnectionView, HubError> {
        Ok(self.get(name).await?.view().await)
    }

    pub async fn all_views(&self) -> Vec<ServerConnectionView> {
        let connections: Vec<_> = self.connections.read().await.values().cloned().collect();
        join_all(connections.iter().map(|conn| conn.view())).await
    }

    pub async fn has_server(&self, name: &str) -> bool {
        self.connections.read().await.contains_key(name)
    }

    async fn get(&self, name: &str) -> Result<Arc<ServerConnection>, HubError> {
        self.connections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| HubError::server_not_found(name))
    }

    pub fn oauth(&self) -> Arc<HubOAuthManager> {
        self.auth.clone()
    }

    pub fn subscribe_events(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    /// Handle used by callers outside the coordinator (SSE connection
    /// tracking) that need to emit events the coordinator itself has no
    /// opinion about, such as `heartbeat`.
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    /// Enter `stopping` ahead of process exit (idle auto-shutdown, spec §4.5).
    pub async fn begin_shutdown(&self) {
        self.transition(HubState::Stopping).await;
    }

    pub async fn finish_shutdown(&self) {
        self.transition(HubState::Stopped).await;
    }
}

async fn connect_each(connections: &[Arc<ServerConnection>]) {
    let results = join_all(connections.iter().map(|conn| {
        let conn = conn.clone();
        async move {
            let name = conn.name().to_string();
            resolve_and_connect(&conn).await.map_err(|err| (name, err))
        }
    }))
    .await;

    for result in results {
        if let Err((name, err)) = result {
            warn!(server = %name, %err, "failed to connect server");
        }
    }
}

fn to_config_delta(diff: &Diff) -> mcp_hub_core::ConfigDelta {
    mcp_hub_core::ConfigDelta {
        added: diff.added.clone(),
        removed: diff.removed.clone(),
        modified: diff.modified.clone(),
        unchanged: diff.unchanged.clone(),
    }
}

/// Resolve placeholders in `connection`'s current config, replace it with
/// the resolved copy, then connect (spec §4.1: resolution runs once per
/// connect attempt, immediately before transport attach — see DESIGN.md
/// for why this lives here rather than in the config loader or the
/// connection itself).
async fn resolve_and_connect(connection: &Arc<ServerConnection>) -> Result<(), HubError> {
    let raw = connection.config().await;
    let resolved = resolve_config(&raw).await?;
    connection.set_config(resolved).await;
    connection.connect().await
}

async fn resolve_config(config: &ServerConfig) -> Result<ServerConfig, HubError> {
    let resolver = Resolver::new(true);
    let workspace_folder = mcp_hub_config::infer_workspace_folder(Some(&config.config_source));
    let base_ctx = ResolutionContext::build(&workspace_folder);

    let transport = match &config.transport {
        TransportConfig::Stdio { command, args, env, cwd, dev } => {
            let resolved_env = resolver
                .resolve_env(env, &base_ctx)
                .await
                .map_err(|err| HubError::config(format!("failed to resolve env: {err}")))?;
            let ctx = base_ctx.with_server_env(&resolved_env);
            let command = resolver
                .resolve(command, &ctx)
                .await
                .map_err(|err| HubError::config(format!("failed to resolve command: {err}")))?;
            let args = resolver
                .resolve_args(args, &ctx)
                .await
                .map_err(|err| HubError::config(format!("failed to resolve args: {err}")))?;
            let cwd = match cwd {
                Some(c) => Some(
                    resolver
                        .resolve(c, &ctx)
                        .await
                        .map_err(|err| HubError::config(format!("failed to resolve cwd: {err}")))?,
                ),
                None => None,
            };
            TransportConfig::Stdio {
                command,
                args,
                env: resolved_env
                    .into_iter()
                    .map(|(k, v)| (k, Some(v)))
                    .collect::<HashMap<_, _>>(),
                cwd,
                dev: dev.clone(),
            }
        }
        TransportConfig::Remote { url, headers } => {
            let url = resolver
                .resolve(url, &base_ctx)
                .await
                .map_err(|err| HubError::config(format!("failed to resolve url: {err}")))?;
            let headers = resolver
                .resolve_headers(headers, &base_ctx)
                .await
                .map_err(|err| HubError::config(format!("failed to resolve headers: {err}")))?;
            TransportConfig::Remote { url, headers }
        }
    };

    Ok(ServerConfig {
        name: config.name.clone(),
        transport,
        disabled: config.disabled,
        display_name: config.display_name.clone(),
        config_source: config.config_source.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_delta_carries_diff_fields_through() {
        let diff = Diff {
            added: vec!["a".to_string()],
            removed: vec!["b".to_string()],
            modified: vec!["c".to_string()],
            unchanged: vec!["d".to_string()],
        };
        let delta = to_config_delta(&diff);
        assert_eq!(delta.added, vec!["a".to_string()]);
        assert_eq!(delta.removed, vec!["b".to_string()]);
        assert_eq!(delta.modified, vec!["c".to_string()]);
        assert_eq!(delta.unchanged, vec!["d".to_string()]);
    }
}
