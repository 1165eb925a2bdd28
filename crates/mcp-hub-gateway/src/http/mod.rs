//! Management API + Unified Upstream Endpoint HTTP server (spec §6).

mod envelope;
mod error;
mod handlers;
mod idle;
mod sse;
mod state;

pub use idle::ConnectionTracker;
pub use state::AppState;

use crate::coordinator::HubCoordinator;
use crate::upstream::HubUpstreamHandler;
use axum::routing::{get, post};
use axum::Router;
use mcp_hub_core::HubEvent;
use mcp_hub_workspace::{watch_cache_file, WorkspaceCache};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct HttpServer {
    addr: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
    connections: ConnectionTracker,
    coordinator: Arc<HubCoordinator>,
    workspaces: Arc<WorkspaceCache>,
}

impl HttpServer {
    /// `auto_shutdown`/`shutdown_delay_ms` configure the idle auto-shutdown
    /// described in spec §4.5; `shutdown_delay_ms` is only consulted when
    /// `auto_shutdown` is set.
    pub fn new(
        port: u16,
        coordinator: Arc<HubCoordinator>,
        workspaces: Arc<WorkspaceCache>,
        base_url: String,
        auto_shutdown: bool,
        shutdown_delay_ms: u64,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let coordinator_handle = coordinator.clone();
        let connections = ConnectionTracker::new(
            auto_shutdown,
            shutdown_delay_ms,
            port,
            workspaces.clone(),
            coordinator.clone(),
            shutdown.clone(),
        );
        let state = AppState {
            coordinator: coordinator.clone(),
            workspaces: workspaces.clone(),
            base_url,
            shutdown: shutdown.clone(),
            connections: connections.clone(),
        };

        let upstream_handler = HubUpstreamHandler::new(coordinator);
        let mcp_service = StreamableHttpService::new(
            move || Ok(upstream_handler.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: Some(std::time::Duration::from_secs(30)),
                sse_retry: Some(std::time::Duration::from_secs(3)),
                cancellation_token: shutdown.clone(),
            },
        );

        let router = Router::new()
            .route("/api/health", get(handlers::health))
            .route("/api/servers", get(handlers::list_servers))
            .route("/api/servers/info", post(handlers::server_info))
            .route("/api/servers/start", post(handlers::start_server))
            .route("/api/servers/stop", post(handlers::stop_server))
            .route("/api/servers/refresh", post(handlers::refresh_server))
            .route("/api/refresh", get(handlers::refresh_all))
            .route("/api/servers/tools", post(handlers::call_tool))
            .route("/api/servers/resources", post(handlers::read_resource))
            .route("/api/servers/prompts", post(handlers::get_prompt))
            .route("/api/servers/authorize", post(handlers::authorize_server))
            .route("/oauth/callback", get(handlers::oauth_callback))
            .route("/oauth/manual_callback", post(handlers::oauth_manual_callback))
            .route("/api/restart", post(handlers::restart))
            .route("/api/hard-restart", post(handlers::hard_restart))
            .route("/api/workspaces", get(handlers::workspaces))
            .route("/api/events", get(sse::events))
            .with_state(state)
            .nest_service("/mcp", mcp_service)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        Self {
            addr,
            router,
            shutdown,
            connections,
            coordinator: coordinator_handle,
            workspaces,
        }
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Watches the shared workspace cache file for mutations by any
    /// process and broadcasts `workspaces_updated` on each one, so a
    /// sibling hub registering or pruning itself is visible to this hub's
    /// SSE subscribers too (spec §4.5, §8 scenario 5).
    fn spawn_cache_watch(&self) {
        let coordinator = self.coordinator.clone();
        let shutdown = self.shutdown.clone();
        let mut changes = watch_cache_file(self.workspaces.path());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = changes.recv() => {
                        match changed {
                            Some(()) => { coordinator.events().emit(HubEvent::WorkspacesUpdated); }
                            None => break,
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    fn spawn_heartbeat(&self) {
        let connections = self.connections.clone();
        let coordinator = self.coordinator.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        coordinator.events().emit(HubEvent::Heartbeat {
                            connections: connections.count(),
                        });
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    pub async fn run(self) -> std::io::Result<()> {
        info!(addr = %self.addr, "mcp hub listening");
        self.spawn_heartbeat();
        self.spawn_cache_watch();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}
