//! Config file watcher (spec §4.2): reload-and-diff on any change, surviving
//! atomic-rename saves by re-establishing the watch when a file disappears.

use crate::loader::{ConfigLoader, Diff, LoadedConfig};
use mcp_hub_core::HubError;
use notify::Watcher;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEBOUNCE: Duration = Duration::from_millis(250);

/// A reload-and-diff result delivered to the watcher's consumer.
pub struct ReconcileEvent {
    pub loaded: LoadedConfig,
    pub diff: Diff,
}

/// Watches the loader's config files and emits a [`ReconcileEvent`] on
/// every reload, significant or not (spec §4.5: "config file change
/// detected, even if not significant"); the consumer decides whether
/// `diff.is_significant()` warrants reconciling connections. Runs until the
/// returned sender (and the underlying debouncer) are dropped.
pub async fn watch(
    loader: ConfigLoader,
    mut previous: LoadedConfig,
) -> Result<mpsc::Receiver<ReconcileEvent>, HubError> {
    let (tx, rx) = mpsc::channel(16);
    let (watch_tx, mut watch_rx) = mpsc::channel::<()>(16);

    let paths: Vec<PathBuf> = loader.paths().to_vec();
    let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| {
        if result.is_ok() {
            let _ = watch_tx.blocking_send(());
        }
    })
    .map_err(|err| HubError::config(format!("failed to start config watcher: {err}")))?;

    for path in &paths {
        let parent = path.parent().unwrap_or(std::path::Path::new("."));
        if let Err(err) = debouncer
            .watcher()
            .watch(parent, notify::RecursiveMode::NonRecursive)
        {
            warn!(path = %parent.display(), %err, "failed to watch config directory");
        }
    }

    tokio::spawn(async move {
        // Debouncer must stay alive for the lifetime of the watch loop.
        let _debouncer = debouncer;
        while watch_rx.recv().await.is_some() {
            match loader.load().await {
                Ok(next) => {
                    let diff = ConfigLoader::diff(&previous, &next);
                    debug!(
                        added = diff.added.len(),
                        removed = diff.removed.len(),
                        modified = diff.modified.len(),
                        significant = diff.is_significant(),
                        "config reload detected"
                    );
                    previous = next.clone();
                    if tx.send(ReconcileEvent { loaded: next, diff }).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "config reload failed, keeping previous state");
                }
            }
        }
    });

    Ok(rx)
}
