//! MCP Hub gateway: the Hub Coordinator, outbound OAuth, the Unified
//! Upstream Endpoint, and the Management API HTTP server.

pub mod coordinator;
pub mod http;
pub mod oauth;
pub mod upstream;

pub use coordinator::HubCoordinator;
pub use http::HttpServer;
pub use oauth::HubOAuthManager;
pub use upstream::HubUpstreamHandler;
