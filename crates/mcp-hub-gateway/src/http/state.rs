//! Shared state every Management API handler extracts (spec §6).

use super::idle::ConnectionTracker;
use crate::coordinator::HubCoordinator;
use mcp_hub_workspace::WorkspaceCache;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<HubCoordinator>,
    pub workspaces: Arc<WorkspaceCache>,
    pub base_url: String,
    pub shutdown: CancellationToken,
    pub connections: ConnectionTracker,
}
