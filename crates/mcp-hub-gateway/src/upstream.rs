//! Unified Upstream Endpoint (spec §4.6, §6 `/mcp`): a single rmcp
//! `ServerHandler` exposing the namespaced union of every connected
//! server's tools, resources, and prompts. Calls are routed back out to
//! the owning server by splitting the qualified name on
//! [`NAMESPACE_SEPARATOR`].
//!
//! Grounded on the shape of a multi-backend aggregating handler, but
//! drastically simplified: no grants, no spaces, no per-client
//! authorization — every MCP client that reaches this hub sees the same
//! aggregated surface.

use crate::coordinator::HubCoordinator;
use dashmap::DashMap;
use mcp_hub_core::{split_qualified_name, Capability, CapabilityKind, HubEvent};
use rmcp::model::{
    CallToolRequestParams, GetPromptRequestParams, Implementation, ListPromptsResult,
    ListResourcesResult, ListToolsResult, PaginatedRequestParams, Prompt,
    ProtocolVersion, ReadResourceRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{NotificationContext, Peer, RequestContext};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct HubUpstreamHandler {
    coordinator: Arc<HubCoordinator>,
    peers: Arc<DashMap<Uuid, Arc<Peer<RoleServer>>>>,
}

impl HubUpstreamHandler {
    pub fn new(coordinator: Arc<HubCoordinator>) -> Self {
        let handler = Self {
            coordinator,
            peers: Arc::new(DashMap::new()),
        };
        handler.spawn_list_changed_forwarder();
        handler
    }

    /// Forward `*ListChanged` hub events to every registered peer as MCP
    /// `notifications/*/list_changed`. A peer whose send fails (session
    /// gone) is dropped from the registry rather than retried.
    fn spawn_list_changed_forwarder(&self) {
        let peers = self.peers.clone();
        let mut rx = self.coordinator.subscribe_events();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let kind = match envelope.event {
                    HubEvent::ToolListChanged { .. } => NotifyKind::Tools,
                    HubEvent::ResourceListChanged { .. } => NotifyKind::Resources,
                    HubEvent::PromptListChanged { .. } => NotifyKind::Prompts,
                    _ => continue,
                };
                let mut dead = Vec::new();
                for entry in peers.iter() {
                    let result = match kind {
                        NotifyKind::Tools => entry.value().notify_tool_list_changed().await,
                        NotifyKind::Resources => entry.value().notify_resource_list_changed().await,
                        NotifyKind::Prompts => entry.value().notify_prompt_list_changed().await,
                    };
                    if result.is_err() {
                        dead.push(*entry.key());
                    }
                }
                for id in dead {
                    peers.remove(&id);
                }
            }
        });
    }

    async fn capabilities(&self, kind: CapabilityKind) -> Vec<Capability> {
        self.coordinator
            .all_views()
            .await
            .into_iter()
            .flat_map(|view| match kind {
                CapabilityKind::Tool => view.tools,
                CapabilityKind::Resource => view.resources,
                CapabilityKind::ResourceTemplate => view.resource_templates,
                CapabilityKind::Prompt => view.prompts,
            })
            .collect()
    }

    fn route(&self, qualified: &str) -> Result<(String, String), McpError> {
        split_qualified_name(qualified)
            .map(|(server, name)| (server.to_string(), name.to_string()))
            .ok_or_else(|| {
                McpError::invalid_params(format!("'{qualified}' is not a namespaced name"), None)
            })
    }
}

#[derive(Clone, Copy)]
enum NotifyKind {
    Tools,
    Resources,
    Prompts,
}

impl ServerHandler for HubUpstreamHandler {
    fn get_info(&self) -> ServerInfo {
        use rmcp::model::{PromptsCapability, ResourcesCapability, ToolsCapability};

        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools_with(ToolsCapability { list_changed: Some(true) })
                .enable_prompts_with(PromptsCapability { list_changed: Some(true) })
                .enable_resources_with(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(true),
                })
                .build(),
            server_info: Implementation {
                name: "mcp-hub".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Aggregates tools, resources, and prompts from every server the hub \
                 has connected. Names are namespaced as `<server>__<name>`."
                    .to_string(),
            ),
        }
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        let id = Uuid::new_v4();
        self.peers.insert(id, Arc::new(context.peer));
        debug!(peer = %id, "upstream client initialized");
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools: Vec<Tool> = self
            .capabilities(CapabilityKind::Tool)
            .await
            .into_iter()
            .filter_map(|cap| {
                let qualified = cap.qualified_name();
                let mut tool: Tool = serde_json::from_value(cap.raw).ok()?;
                tool.name = qualified.into();
                Some(tool)
            })
            .collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<rmcp::model::CallToolResult, McpError> {
        let (server_name, tool_name) = self.route(params.name.as_ref())?;
        let arguments = params.arguments.map(serde_json::Value::Object);
        self.coordinator
            .call_tool(&server_name, &tool_name, arguments)
            .await
            .map_err(hub_error_to_mcp)
    }

    async fn list_prompts(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let prompts: Vec<Prompt> = self
            .capabilities(CapabilityKind::Prompt)
            .await
            .into_iter()
            .filter_map(|cap| {
                let qualified = cap.qualified_name();
                let mut prompt: Prompt = serde_json::from_value(cap.raw).ok()?;
                prompt.name = qualified;
                Some(prompt)
            })
            .collect();
        Ok(ListPromptsResult::with_all_items(prompts))
    }

    async fn get_prompt(
        &self,
        params: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<rmcp::model::GetPromptResult, McpError> {
        let (server_name, prompt_name) = self.route(params.name.as_ref())?;
        let arguments = params.arguments.map(serde_json::Value::Object);
        self.coordinator
            .get_prompt(&server_name, &prompt_name, arguments)
            .await
            .map_err(hub_error_to_mcp)
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = self
            .capabilities(CapabilityKind::Resource)
            .await
            .into_iter()
            .filter_map(|cap| serde_json::from_value(cap.raw).ok())
            .collect();
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<rmcp::model::ReadResourceResult, McpError> {
        // Resources are passed through by URI (spec §4.6): the owning server
        // is whichever connection currently reports this exact URI.
        let views = self.coordinator.all_views().await;
        let owner = views.iter().find(|view| {
            view.resources.iter().any(|cap| cap.name == params.uri)
                || view.resource_templates.iter().any(|cap| cap.name == params.uri)
        });
        let Some(owner) = owner else {
            return Err(McpError::invalid_params(
                format!("resource '{}' not found", params.uri),
                None,
            ));
        };
        self.coordinator
            .read_resource(&owner.name, &params.uri)
            .await
            .map_err(hub_error_to_mcp)
    }
}

fn hub_error_to_mcp(err: mcp_hub_core::HubError) -> McpError {
    McpError::internal_error(err.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_hub_core::create_shared_event_bus;
    use std::path::PathBuf;

    fn handler() -> HubUpstreamHandler {
        let bus = create_shared_event_bus();
        let store = Arc::new(mcp_hub_workspace::OAuthStore::new(PathBuf::from(
            "/tmp/mcp-hub-upstream-test-oauth.json",
        )));
        let auth = Arc::new(crate::oauth::HubOAuthManager::new(
            store,
            "http://127.0.0.1:0",
            bus.sender(),
        ));
        HubUpstreamHandler::new(Arc::new(HubCoordinator::new(auth, bus)))
    }

    #[tokio::test]
    async fn route_splits_on_first_separator() {
        let (server, name) = handler().route("github__search_code").unwrap();
        assert_eq!(server, "github");
        assert_eq!(name, "search_code");
    }

    #[tokio::test]
    async fn route_rejects_unnamespaced_input() {
        assert!(handler().route("search_code").is_err());
    }
}
