//! Domain entities and value objects shared by every MCP Hub crate.

pub mod capability;
pub mod connection;
pub mod hub_state;
pub mod oauth_state;
pub mod server_config;
pub mod workspace_entry;

pub use capability::{split_qualified_name, Capability, CapabilityKind, NAMESPACE_SEPARATOR};
pub use connection::{ConnectionStatus, ServerConnectionView, ServerInfo, TransportType};
pub use hub_state::HubState;
pub use oauth_state::{ClientRegistration, OAuthState, OAuthTokens};
pub use server_config::{DevConfig, RawServerEntry, ServerConfig, ServerConfigError, TransportConfig};
pub use workspace_entry::{WorkspaceEntry, WorkspaceState};
