//! rmcp `ClientHandler` installed on every outbound MCP session (spec §4.3:
//! "install notification handlers for list-changed notifications").

use mcp_hub_core::domain::CapabilityKind;
use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::NotificationContext;
use rmcp::RoleClient;
use tokio::sync::mpsc;

/// Forwarded to the owning `ServerConnection`'s notification loop, which
/// re-fetches the changed list and emits the corresponding hub event.
#[derive(Debug, Clone, Copy)]
pub enum CapabilityChanged {
    Tools,
    Resources,
    Prompts,
}

impl From<CapabilityChanged> for CapabilityKind {
    fn from(value: CapabilityChanged) -> Self {
        match value {
            CapabilityChanged::Tools => CapabilityKind::Tool,
            CapabilityChanged::Resources => CapabilityKind::Resource,
            CapabilityChanged::Prompts => CapabilityKind::Prompt,
        }
    }
}

#[derive(Clone)]
pub struct Handler {
    server_name: String,
    notify: mpsc::UnboundedSender<CapabilityChanged>,
}

impl Handler {
    pub fn new(server_name: impl Into<String>, notify: mpsc::UnboundedSender<CapabilityChanged>) -> Self {
        Self {
            server_name: server_name.into(),
            notify,
        }
    }
}

impl rmcp::ClientHandler for Handler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: format!("mcp-hub-{}", self.server_name),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("MCP Hub".to_string()),
                ..Default::default()
            },
            meta: None,
        }
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let _ = self.notify.send(CapabilityChanged::Tools);
        }
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let _ = self.notify.send(CapabilityChanged::Resources);
        }
    }

    fn on_prompt_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move {
            let _ = self.notify.send(CapabilityChanged::Prompts);
        }
    }
}
