//! Per-server MCP transport and connection state machine.
//!
//! This crate owns exactly one concern: driving a single upstream MCP
//! server through its connection lifecycle (spec §4.3) — connect (stdio
//! child process, or streamable-HTTP with an SSE fallback), capability
//! discovery, request forwarding, dev-mode restart-on-change, and
//! best-effort disconnect. The Hub Coordinator (in the gateway crate) holds
//! one [`ServerConnection`] per configured server and drives reconciliation,
//! aggregation, and the management/upstream HTTP surfaces on top of it.
//!
//! OAuth is a seam, not a dependency: [`AuthProvider`] lets the gateway's
//! OAuth subsystem supply bearer tokens and authorization URLs without this
//! crate knowing anything about PKCE, dynamic client registration, or token
//! storage.

pub mod auth;
pub mod connection;
pub mod dev_watch;
pub mod handler;
pub mod transport;

pub use auth::{AuthProvider, NoAuth};
pub use connection::ServerConnection;
pub use dev_watch::{spawn_dev_watcher, DevWatchHandle};
pub use handler::{CapabilityChanged, Handler};
pub use transport::{connect_remote, connect_stdio, ConnectOutcome, Session, CONNECT_TIMEOUT};
