//! MCP Hub entry point: parses CLI flags, bootstraps logging, wires the
//! Hub Coordinator to the Management API and Unified Upstream Endpoint, and
//! registers this instance in the Workspace Cache for the duration of the
//! process (spec §3, §6).

use anyhow::{Context, Result};
use clap::Parser;
use mcp_hub_core::{create_shared_event_bus, BusLogLayer, EventSender, WorkspaceEntry};
use mcp_hub_gateway::oauth::HubOAuthManager;
use mcp_hub_gateway::{HttpServer, HubCoordinator};
use mcp_hub_workspace::{OAuthStore, WorkspaceCache};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// A long-running coordinator that multiplexes multiple MCP servers behind
/// a single REST/SSE management API and a single unified MCP endpoint.
#[derive(Parser)]
#[command(name = "mcp-hub", version, about)]
struct Cli {
    /// Port the Management API and Unified Upstream Endpoint listen on.
    #[arg(long)]
    port: u16,

    /// JSONC config file to load; repeatable, order preserved, merged left
    /// to right with later files winning on key conflicts.
    #[arg(long = "config", required = true)]
    config: Vec<PathBuf>,

    /// Watch config files for changes and reconcile connections live.
    #[arg(long)]
    watch: bool,

    /// Shut the hub down after the last SSE subscriber disconnects and
    /// `--shutdown-delay` elapses with no re-subscription.
    #[arg(long)]
    auto_shutdown: bool,

    /// Idle grace period in milliseconds before `--auto-shutdown` fires.
    #[arg(long, default_value_t = 10_000)]
    shutdown_delay: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let bus = create_shared_event_bus();
    let _log_guard = init_logging(bus.sender())?;

    match run(cli, bus).await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(%err, "mcp hub exited with a fatal startup error");
            std::process::exit(1);
        }
    }
}

/// Installs the file-writing `fmt` layer alongside [`BusLogLayer`], so every
/// `WARN`/`ERROR` record also reaches SSE subscribers on the `log` stream.
fn init_logging(sender: EventSender) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = mcp_hub_core::platform::logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("failed to create log directory {}", logs_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "mcp-hub.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(BusLogLayer::new(sender, false))
        .init();

    Ok(guard)
}

async fn run(cli: Cli, bus: mcp_hub_core::SharedEventBus) -> Result<()> {
    let base_url = format!("http://127.0.0.1:{}", cli.port);

    let oauth_store = Arc::new(OAuthStore::new(mcp_hub_core::platform::oauth_storage_path()));
    let auth = Arc::new(HubOAuthManager::new(oauth_store, base_url.clone(), bus.sender()));

    let coordinator = Arc::new(HubCoordinator::new(auth, bus));
    coordinator
        .initialize(cli.config.clone(), cli.watch)
        .await
        .context("failed to initialize hub coordinator")?;

    let workspaces = Arc::new(WorkspaceCache::new(mcp_hub_core::platform::workspace_cache_path()));
    register_workspace_entry(&workspaces, &cli, cli.port).await?;

    let server = HttpServer::new(
        cli.port,
        coordinator,
        workspaces.clone(),
        base_url,
        cli.auto_shutdown,
        cli.shutdown_delay,
    );

    let result = server.run().await;
    let _ = workspaces.remove(cli.port).await;
    result.context("http server exited with an error")?;
    Ok(())
}

async fn register_workspace_entry(
    workspaces: &WorkspaceCache,
    cli: &Cli,
    port: u16,
) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let entry = WorkspaceEntry::new(cwd, cli.config.clone(), std::process::id(), port);
    workspaces
        .upsert(entry)
        .await
        .context("failed to register workspace cache entry")?;
    Ok(())
}
