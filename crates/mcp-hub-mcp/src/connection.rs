//! `ServerConnection` — the per-server state machine (spec §4.3).

use crate::auth::AuthProvider;
use crate::dev_watch::{spawn_dev_watcher, DevWatchHandle};
use crate::handler::CapabilityChanged;
use crate::transport::{connect_remote, connect_stdio, ConnectOutcome, Session};
use chrono::Utc;
use mcp_hub_core::domain::{
    Capability, CapabilityKind, ConnectionStatus, DevConfig, ServerConfig, ServerConnectionView,
    ServerInfo, TransportConfig, TransportType,
};
use mcp_hub_core::event::{log_event, LogLevel};
use mcp_hub_core::event_bus::EventSender;
use mcp_hub_core::HubEvent;
use mcp_hub_core::HubError;
use rmcp::model::{CallToolRequestParams, GetPromptRequestParams, ReadResourceRequestParams};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Best-effort session termination deadline (spec §5).
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct State {
    status: ConnectionStatus,
    error: Option<String>,
    transport_type: Option<TransportType>,
    server_info: Option<ServerInfo>,
    start_time: Option<chrono::DateTime<Utc>>,
    last_started: Option<chrono::DateTime<Utc>>,
    tools: Vec<Capability>,
    resources: Vec<Capability>,
    resource_templates: Vec<Capability>,
    prompts: Vec<Capability>,
    authorization_url: Option<String>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            error: None,
            transport_type: None,
            server_info: None,
            start_time: None,
            last_started: None,
            tools: Vec::new(),
            resources: Vec::new(),
            resource_templates: Vec::new(),
            prompts: Vec::new(),
            authorization_url: None,
        }
    }
}

pub struct ServerConnection {
    name: String,
    config: RwLock<ServerConfig>,
    events: EventSender,
    auth: Arc<dyn AuthProvider>,
    state: RwLock<State>,
    session: Mutex<Option<Session>>,
    notify_task: Mutex<Option<JoinHandle<()>>>,
    dev_watch_task: Mutex<Option<JoinHandle<()>>>,
    dev_watch: Mutex<Option<DevWatchHandle>>,
}

impl ServerConnection {
    pub fn new(config: ServerConfig, events: EventSender, auth: Arc<dyn AuthProvider>) -> Arc<Self> {
        let name = config.name.clone();
        let mut state = State::default();
        if config.disabled {
            state.status = ConnectionStatus::Disabled;
        }
        Arc::new(Self {
            name,
            config: RwLock::new(config),
            events,
            auth,
            state: RwLock::new(state),
            session: Mutex::new(None),
            notify_task: Mutex::new(None),
            dev_watch_task: Mutex::new(None),
            dev_watch: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn config(&self) -> ServerConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: ServerConfig) {
        *self.config.write().await = config;
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    pub async fn view(&self) -> ServerConnectionView {
        let config = self.config.read().await;
        let state = self.state.read().await;
        ServerConnectionView {
            name: self.name.clone(),
            display_name: config.display_name.clone(),
            description: None,
            transport_type: state.transport_type,
            status: state.status,
            error: state.error.clone(),
            start_time: state.start_time,
            last_started: state.last_started,
            tools: state.tools.clone(),
            resources: state.resources.clone(),
            resource_templates: state.resource_templates.clone(),
            prompts: state.prompts.clone(),
            authorization_url: state.authorization_url.clone(),
            server_info: state.server_info.clone(),
            config_source: config.config_source.display().to_string(),
        }
    }

    /// Connect per the spec §4.3 procedure. Idempotent: always tears down
    /// any existing session first.
    pub async fn connect(self: &Arc<Self>) -> Result<(), HubError> {
        self.teardown_session().await;

        let config = self.config.read().await.clone();
        if config.disabled {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Disabled;
            return Ok(());
        }

        {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Connecting;
            state.error = None;
            state.start_time = Some(Utc::now());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = self.attempt_transport(&config, tx).await;
        self.apply_outcome(outcome, rx, true).await
    }

    async fn attempt_transport(
        &self,
        config: &ServerConfig,
        notify: mpsc::UnboundedSender<CapabilityChanged>,
    ) -> ConnectOutcome {
        match &config.transport {
            TransportConfig::Stdio { command, args, env, cwd, .. } => {
                let resolved_env = flatten_env(env);
                connect_stdio(&self.name, command, args, &resolved_env, cwd.as_deref(), notify).await
            }
            TransportConfig::Remote { url, headers } => {
                connect_remote(&self.name, url, headers, self.auth.as_ref(), notify).await
            }
        }
    }

    async fn apply_outcome(
        self: &Arc<Self>,
        outcome: ConnectOutcome,
        notify_rx: mpsc::UnboundedReceiver<CapabilityChanged>,
        start_dev_watch: bool,
    ) -> Result<(), HubError> {
        match outcome {
            ConnectOutcome::Connected { session, transport_type } => {
                self.on_connected(session, transport_type, notify_rx, start_dev_watch)
                    .await;
                Ok(())
            }
            ConnectOutcome::Unauthorized { authorization_url } => {
                let mut state = self.state.write().await;
                state.status = ConnectionStatus::Unauthorized;
                state.authorization_url = authorization_url;
                state.error = Some("authorization required".into());
                Ok(())
            }
            ConnectOutcome::Failed(err) => {
                let mut state = self.state.write().await;
                state.status = ConnectionStatus::Disconnected;
                state.error = Some(err.clone());
                drop(state);
                self.teardown_session().await;
                Err(HubError::connection(err))
            }
        }
    }

    async fn on_connected(
        self: &Arc<Self>,
        session: Session,
        transport_type: TransportType,
        notify_rx: mpsc::UnboundedReceiver<CapabilityChanged>,
        start_dev_watch: bool,
    ) {
        let server_info = session.peer_info().map(|info| ServerInfo {
            name: info.server_info.name.clone(),
            version: info.server_info.version.clone(),
        });

        *self.session.lock().await = Some(session);

        {
            let mut state = self.state.write().await;
            state.transport_type = Some(transport_type);
            state.server_info = server_info;
            state.last_started = Some(Utc::now());
        }

        self.fetch_capabilities().await;

        {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Connected;
            state.error = None;
            state.authorization_url = None;
        }

        self.spawn_notify_loop(notify_rx).await;

        if start_dev_watch {
            let config = self.config.read().await.clone();
            if let TransportConfig::Stdio { dev: Some(dev), .. } = &config.transport {
                if dev.enabled {
                    self.start_dev_watch(dev.clone()).await;
                }
            }
        }
    }

    /// Fetch tools, resources, resource templates, and prompts, each
    /// tolerant of "method not found" since not every server implements
    /// every capability (spec §4.3).
    async fn fetch_capabilities(&self) {
        let guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            return;
        };

        let tools = match session.peer().list_all_tools().await {
            Ok(tools) => tools
                .into_iter()
                .map(|tool| {
                    Capability::new(
                        self.name.as_str(),
                        CapabilityKind::Tool,
                        tool.name.to_string(),
                        serde_json::to_value(&tool).unwrap_or_default(),
                    )
                })
                .collect(),
            Err(err) => {
                debug!(server = %self.name, %err, "tools/list unavailable");
                Vec::new()
            }
        };

        let resources = match session.peer().list_all_resources().await {
            Ok(resources) => resources
                .into_iter()
                .map(|resource| {
                    Capability::new(
                        self.name.as_str(),
                        CapabilityKind::Resource,
                        resource.uri.clone(),
                        serde_json::to_value(&resource).unwrap_or_default(),
                    )
                })
                .collect(),
            Err(err) => {
                debug!(server = %self.name, %err, "resources/list unavailable");
                Vec::new()
            }
        };

        let resource_templates = match session
            .peer()
            .list_resource_templates(Default::default())
            .await
        {
            Ok(result) => result
                .resource_templates
                .into_iter()
                .map(|template| {
                    Capability::new(
                        self.name.as_str(),
                        CapabilityKind::ResourceTemplate,
                        template.uri_template.clone(),
                        serde_json::to_value(&template).unwrap_or_default(),
                    )
                })
                .collect(),
            Err(err) => {
                debug!(server = %self.name, %err, "resources/templates/list unavailable");
                Vec::new()
            }
        };

        let prompts = match session.peer().list_all_prompts().await {
            Ok(prompts) => prompts
                .into_iter()
                .map(|prompt| {
                    Capability::new(
                        self.name.as_str(),
                        CapabilityKind::Prompt,
                        prompt.name.clone(),
                        serde_json::to_value(&prompt).unwrap_or_default(),
                    )
                })
                .collect(),
            Err(err) => {
                debug!(server = %self.name, %err, "prompts/list unavailable");
                Vec::new()
            }
        };

        drop(guard);

        let mut state = self.state.write().await;
        state.tools = tools;
        state.resources = resources;
        state.resource_templates = resource_templates;
        state.prompts = prompts;
    }

    /// Force a capability re-fetch (spec §4.4 `refreshServer`).
    pub async fn refresh(&self) {
        if self.status().await != ConnectionStatus::Connected {
            return;
        }
        self.fetch_capabilities().await;
    }

    async fn spawn_notify_loop(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<CapabilityChanged>,
    ) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(changed) = rx.recv().await {
                this.on_capability_changed(changed).await;
            }
        });
        *self.notify_task.lock().await = Some(handle);
    }

    async fn on_capability_changed(&self, changed: CapabilityChanged) {
        self.fetch_capabilities().await;
        let state = self.state.read().await;
        let event = match changed {
            CapabilityChanged::Tools => HubEvent::ToolListChanged {
                server_name: self.name.clone(),
                tools: state.tools.clone(),
            },
            CapabilityChanged::Resources => HubEvent::ResourceListChanged {
                server_name: self.name.clone(),
                resources: state.resources.clone(),
            },
            CapabilityChanged::Prompts => HubEvent::PromptListChanged {
                server_name: self.name.clone(),
                prompts: state.prompts.clone(),
            },
        };
        drop(state);
        self.events.emit(event);
    }

    async fn start_dev_watch(self: &Arc<Self>, dev: DevConfig) {
        let (handle, mut rx) = spawn_dev_watcher(&dev.cwd, &dev.watch);
        *self.dev_watch.lock().await = Some(handle);

        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                info!(server = %this.name, "dev watcher batch, restarting (watcher preserved)");
                this.restart_preserving_watcher().await;
            }
        });
        *self.dev_watch_task.lock().await = Some(task);
    }

    async fn restart_preserving_watcher(self: &Arc<Self>) {
        self.teardown_transport_only().await;

        {
            let mut state = self.state.write().await;
            state.status = ConnectionStatus::Connecting;
        }

        let config = self.config.read().await.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = self.attempt_transport(&config, tx).await;
        if (self.apply_outcome(outcome, rx, false).await).is_ok() {
            self.events.emit(log_event(
                LogLevel::Info,
                "dev_restart",
                format!("{} restarted after dev watcher batch", self.name),
            ));
        }
    }

    async fn stop_dev_watch(&self) {
        if let Some(task) = self.dev_watch_task.lock().await.take() {
            task.abort();
        }
        self.dev_watch.lock().await.take();
    }

    /// Disconnect: remove notification handlers, stop dev watcher, best-effort
    /// session termination, reset capability lists and status (spec §4.3).
    pub async fn disconnect(&self) {
        self.stop_dev_watch().await;
        self.teardown_session().await;

        let disabled = self.config.read().await.disabled;
        let mut state = self.state.write().await;
        *state = State::default();
        if disabled {
            state.status = ConnectionStatus::Disabled;
        }
    }

    /// Tears down the transport but keeps the dev watcher alive, for
    /// restart-preserving-watcher.
    async fn teardown_transport_only(&self) {
        if let Some(task) = self.notify_task.lock().await.take() {
            task.abort();
        }
        if let Some(session) = self.session.lock().await.take() {
            terminate(&self.name, session).await;
        }
    }

    async fn teardown_session(&self) {
        self.teardown_transport_only().await;
    }

    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<rmcp::model::CallToolResult, HubError> {
        self.ensure_callable(CapabilityKind::Tool, tool).await?;
        let ordered_names = self.tool_argument_order(tool).await;
        let args_map = as_object_arguments(arguments, &ordered_names)?;

        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| HubError::server_not_connected(&self.name))?;
        session
            .peer()
            .call_tool(CallToolRequestParams {
                name: tool.to_string().into(),
                arguments: args_map,
                task: None,
                meta: None,
            })
            .await
            .map_err(|err| HubError::tool(&self.name, tool, err.to_string()))
    }

    /// Resource URIs are not validated against templates at the hub level
    /// (spec §4.3), so only connectedness is required here.
    pub async fn read_resource(
        &self,
        uri: &str,
    ) -> Result<rmcp::model::ReadResourceResult, HubError> {
        if self.status().await != ConnectionStatus::Connected {
            return Err(HubError::server_not_connected(&self.name));
        }
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| HubError::server_not_connected(&self.name))?;
        session
            .peer()
            .read_resource(ReadResourceRequestParams {
                uri: uri.to_string(),
                meta: None,
            })
            .await
            .map_err(|err| HubError::resource(&self.name, uri, err.to_string()))
    }

    pub async fn get_prompt(
        &self,
        prompt: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<rmcp::model::GetPromptResult, HubError> {
        self.ensure_callable(CapabilityKind::Prompt, prompt).await?;
        let ordered_names = self.prompt_argument_order(prompt).await;
        let args_map = as_object_arguments(arguments, &ordered_names)?;

        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| HubError::server_not_connected(&self.name))?;
        session
            .peer()
            .get_prompt(GetPromptRequestParams {
                name: prompt.to_string().into(),
                arguments: args_map,
                meta: None,
            })
            .await
            .map_err(|err| HubError::prompt(&self.name, prompt, err.to_string()))
    }

    /// Parameter names in declaration order, read off the tool's JSON
    /// schema (`inputSchema.properties`, which `serde_json`'s
    /// `preserve_order` feature keeps in source order) — used to route an
    /// ordered-sequence `arguments` call onto rmcp's keyed params (spec
    /// §4.3).
    async fn tool_argument_order(&self, tool: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .tools
            .iter()
            .find(|cap| cap.name == tool)
            .and_then(|cap| cap.raw.get("inputSchema")?.get("properties")?.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn prompt_argument_order(&self, prompt: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .prompts
            .iter()
            .find(|cap| cap.name == prompt)
            .and_then(|cap| cap.raw.get("arguments")?.as_array())
            .map(|args| {
                args.iter()
                    .filter_map(|arg| arg.get("name")?.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn ensure_callable(&self, kind: CapabilityKind, name: &str) -> Result<(), HubError> {
        let state = self.state.read().await;
        if state.status != ConnectionStatus::Connected {
            return Err(HubError::server_not_connected(&self.name));
        }
        let present = match kind {
            CapabilityKind::Tool => state.tools.iter().any(|cap| cap.name == name),
            CapabilityKind::Prompt => state.prompts.iter().any(|cap| cap.name == name),
            CapabilityKind::Resource | CapabilityKind::ResourceTemplate => true,
        };
        if !present {
            return Err(match kind {
                CapabilityKind::Tool => HubError::tool(&self.name, name, "tool not found"),
                CapabilityKind::Prompt => HubError::prompt(&self.name, name, "prompt not found"),
                _ => HubError::resource(&self.name, name, "resource not found"),
            });
        }
        Ok(())
    }
}

/// Best-effort termination with a short deadline; failures are logged, never
/// propagated (spec §9 open question, recorded in DESIGN.md).
async fn terminate(server_name: &str, session: Session) {
    match tokio::time::timeout(DISCONNECT_TIMEOUT, session.cancel()).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => warn!(server = %server_name, %err, "best-effort session termination failed"),
        Err(_) => warn!(server = %server_name, "session termination timed out"),
    }
}

fn flatten_env(env: &HashMap<String, Option<String>>) -> HashMap<String, String> {
    env.iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key.clone(), v)))
        .collect()
}

/// Tool/prompt arguments may be a mapping, an ordered sequence, or absent
/// (spec §4.3). A mapping passes straight through; an ordered sequence is
/// zipped positionally onto `ordered_names` (the tool/prompt's declared
/// parameter order) to build the keyed object rmcp's typed request params
/// require.
fn as_object_arguments(
    arguments: Option<serde_json::Value>,
    ordered_names: &[String],
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, HubError> {
    match arguments {
        None => Ok(None),
        Some(serde_json::Value::Object(map)) => Ok(Some(map)),
        Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Array(values)) => {
            if values.len() > ordered_names.len() {
                return Err(HubError::validation(format!(
                    "positional arguments ({}) exceed the declared parameter count ({})",
                    values.len(),
                    ordered_names.len()
                )));
            }
            let map = ordered_names
                .iter()
                .cloned()
                .zip(values)
                .collect::<serde_json::Map<_, _>>();
            Ok(Some(map))
        }
        _ => Err(HubError::validation(
            "arguments must be a mapping, an ordered sequence, or absent",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_sequence_non_object_arguments() {
        let err = as_object_arguments(Some(serde_json::json!("nope")), &[]).unwrap_err();
        assert!(matches!(err, HubError::Validation { .. }));
    }

    #[test]
    fn accepts_object_and_absent_arguments() {
        assert!(as_object_arguments(None, &[]).unwrap().is_none());
        assert!(as_object_arguments(Some(serde_json::json!({"a": 1})), &[])
            .unwrap()
            .is_some());
    }

    #[test]
    fn zips_an_ordered_sequence_onto_declared_parameter_names() {
        let names = vec!["path".to_string(), "recursive".to_string()];
        let map = as_object_arguments(Some(serde_json::json!(["/tmp", true])), &names)
            .unwrap()
            .unwrap();
        assert_eq!(map.get("path"), Some(&serde_json::json!("/tmp")));
        assert_eq!(map.get("recursive"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn rejects_a_sequence_longer_than_the_declared_parameters() {
        let names = vec!["path".to_string()];
        let err = as_object_arguments(Some(serde_json::json!(["/tmp", true])), &names).unwrap_err();
        assert!(matches!(err, HubError::Validation { .. }));
    }
}
