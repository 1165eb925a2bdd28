//! Shared domain types, the event bus, error taxonomy, and platform
//! directory resolution used by every MCP Hub crate.

pub mod domain;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod log_layer;
pub mod platform;

pub use domain::{
    split_qualified_name, Capability, CapabilityKind, ClientRegistration, ConnectionStatus,
    DevConfig, HubState, NAMESPACE_SEPARATOR, OAuthState, OAuthTokens, RawServerEntry,
    ServerConfig, ServerConfigError, ServerConnectionView, ServerInfo, TransportConfig,
    TransportType, WorkspaceEntry, WorkspaceState,
};
pub use error::{ErrorEnvelope, HubError};
pub use event::{log_event, ConfigDelta, HubEvent, HubEventEnvelope, LogLevel, LogPayload};
pub use event_bus::{create_shared_event_bus, EventBus, EventReceiver, EventSender, SharedEventBus};
pub use log_layer::BusLogLayer;
