//! Active SSE connection tracking and optional idle auto-shutdown
//! (spec §4.5, scenario 6).
//!
//! When the last subscriber disconnects, a timer of `shutdownDelay` starts;
//! a re-subscribe before it fires cancels it, otherwise the hub transitions
//! `ready -> stopping -> stopped` and the process exits.

use crate::coordinator::HubCoordinator;
use mcp_hub_core::{HubEvent, WorkspaceState};
use mcp_hub_workspace::WorkspaceCache;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

struct Inner {
    count: AtomicUsize,
    enabled: bool,
    delay_ms: u64,
    port: u16,
    workspace: Arc<WorkspaceCache>,
    coordinator: Arc<HubCoordinator>,
    process_shutdown: CancellationToken,
    pending_timer: Mutex<Option<CancellationToken>>,
}

/// Shared handle; cheap to clone, held by the SSE handler and by `HttpServer`.
#[derive(Clone)]
pub struct ConnectionTracker(Arc<Inner>);

/// Held for the lifetime of one SSE stream. Registers the connection on
/// creation; on drop (stream closed by the client or the server) spawns the
/// disconnect bookkeeping, since `Drop` cannot itself be `async`.
pub struct ConnectionGuard(ConnectionTracker);

impl ConnectionGuard {
    pub async fn register(tracker: ConnectionTracker) -> Self {
        tracker.on_connect().await;
        Self(tracker)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let tracker = self.0.clone();
        tokio::spawn(async move { tracker.on_disconnect().await });
    }
}

impl ConnectionTracker {
    pub fn new(
        enabled: bool,
        delay_ms: u64,
        port: u16,
        workspace: Arc<WorkspaceCache>,
        coordinator: Arc<HubCoordinator>,
        process_shutdown: CancellationToken,
    ) -> Self {
        Self(Arc::new(Inner {
            count: AtomicUsize::new(0),
            enabled,
            delay_ms,
            port,
            workspace,
            coordinator,
            process_shutdown,
            pending_timer: Mutex::new(None),
        }))
    }

    pub fn count(&self) -> usize {
        self.0.count.load(Ordering::SeqCst)
    }

    /// Called when an SSE client subscribes.
    pub async fn on_connect(&self) {
        let count = self.0.count.fetch_add(1, Ordering::SeqCst) + 1;
        self.cancel_pending().await;
        self.sync_workspace(count, WorkspaceState::Active, None).await;
        self.0
            .coordinator
            .events()
            .emit(HubEvent::Heartbeat { connections: count });
    }

    /// Called when an SSE client disconnects (stream dropped).
    pub async fn on_disconnect(&self) {
        let count = self.0.count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        self.0
            .coordinator
            .events()
            .emit(HubEvent::Heartbeat { connections: count });

        if count > 0 {
            self.sync_workspace(count, WorkspaceState::Active, None).await;
            return;
        }

        if self.0.enabled {
            self.start_shutdown_timer().await;
        } else {
            self.sync_workspace(count, WorkspaceState::Active, None).await;
        }
    }

    async fn cancel_pending(&self) {
        if let Some(token) = self.0.pending_timer.lock().await.take() {
            token.cancel();
        }
    }

    async fn start_shutdown_timer(&self) {
        let timer = CancellationToken::new();
        *self.0.pending_timer.lock().await = Some(timer.clone());
        self.sync_workspace(0, WorkspaceState::ShuttingDown, Some(self.0.delay_ms))
            .await;

        let inner = self.clone();
        let delay = Duration::from_millis(self.0.delay_ms);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if inner.0.count.load(Ordering::SeqCst) == 0 {
                        inner.fire().await;
                    }
                }
                _ = timer.cancelled() => {
                    info!("idle auto-shutdown cancelled by re-subscription");
                }
            }
        });
    }

    async fn fire(&self) {
        self.0.coordinator.begin_shutdown().await;
        let _ = self.0.workspace.remove(self.0.port).await;
        self.0
            .coordinator
            .events()
            .emit(HubEvent::WorkspacesUpdated);
        self.0.coordinator.finish_shutdown().await;
        self.0.process_shutdown.cancel();
    }

    async fn sync_workspace(
        &self,
        active_connections: usize,
        state: WorkspaceState,
        shutdown_delay_ms: Option<u64>,
    ) {
        let port = self.0.port;
        let started_at = matches!(state, WorkspaceState::ShuttingDown).then(chrono::Utc::now);
        let result = self
            .0
            .workspace
            .mutate(|entries| {
                if let Some(entry) = entries.get_mut(&port) {
                    entry.active_connections = active_connections as u32;
                    entry.state = state;
                    entry.shutdown_started_at = started_at;
                    entry.shutdown_delay_ms = shutdown_delay_ms;
                }
            })
            .await;
        if result.is_ok() {
            self.0
                .coordinator
                .events()
                .emit(HubEvent::WorkspacesUpdated);
        }
    }
}
