//! Watches the workspace cache file for mutation by any process and signals
//! the hub to broadcast `workspaces_updated` (spec §4.7).

use notify::Watcher;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

const DEBOUNCE: Duration = Duration::from_millis(250);

/// Spawns a watcher on the workspace cache file's parent directory; each
/// detected mutation sends a unit notification. The channel closes when the
/// returned debouncer (kept alive inside the spawned task) is dropped.
pub fn watch_cache_file(cache_path: &Path) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(16);
    let parent = cache_path.parent().map(Path::to_path_buf);

    tokio::spawn(async move {
        let Some(parent) = parent else {
            warn!("workspace cache path has no parent directory, not watching");
            return;
        };
        if let Err(err) = tokio::fs::create_dir_all(&parent).await {
            warn!(%err, "failed to create workspace cache directory for watching");
            return;
        }

        let tx2 = tx.clone();
        let debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| {
            if result.is_ok() {
                let _ = tx2.blocking_send(());
            }
        });

        let mut debouncer = match debouncer {
            Ok(d) => d,
            Err(err) => {
                warn!(%err, "failed to start workspace cache watcher");
                return;
            }
        };

        if let Err(err) = debouncer
            .watcher()
            .watch(&parent, notify::RecursiveMode::NonRecursive)
        {
            warn!(%err, path = %parent.display(), "failed to watch workspace cache directory");
            return;
        }

        // Keep the debouncer alive for the task's lifetime; it's dropped
        // (and the watch torn down) when `tx` closes and the loop below ends.
        while !tx.is_closed() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        drop(debouncer);
    });

    rx
}
