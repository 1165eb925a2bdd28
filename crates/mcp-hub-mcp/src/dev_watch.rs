//! Dev-mode file watcher for stdio servers (spec §4.3): watches the
//! configured glob list within the server's `cwd` and signals a batch so the
//! owning connection can restart-preserving-watcher.
//!
//! `notify-debouncer-mini` only exposes a single timeout knob, so the spec's
//! separate 500 ms debounce / 100 ms stability thresholds collapse into one
//! 500 ms window here (see DESIGN.md).

use notify::Watcher;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

const DEBOUNCE: Duration = Duration::from_millis(500);

pub struct DevWatchHandle {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

/// Watches `cwd` recursively; each debounced batch touching one of `globs`
/// (relative to `cwd`) sends a unit notification. An empty glob list matches
/// everything under `cwd`.
pub fn spawn_dev_watcher(
    cwd: &Path,
    globs: &[String],
) -> (DevWatchHandle, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let patterns: Vec<glob::Pattern> = globs
        .iter()
        .filter_map(|pattern| glob::Pattern::new(pattern).ok())
        .collect();
    let cwd_owned = cwd.to_path_buf();

    let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let matched = events.iter().any(|event| {
                let relative = event.path.strip_prefix(&cwd_owned).unwrap_or(&event.path);
                patterns.is_empty() || patterns.iter().any(|pattern| pattern.matches_path(relative))
            });
            if matched {
                let _ = tx.send(());
            }
        }
        Err(err) => warn!(?err, "dev watcher error"),
    })
    .expect("failed to build dev watch debouncer");

    if let Err(err) = debouncer
        .watcher()
        .watch(cwd, notify::RecursiveMode::Recursive)
    {
        warn!(%err, path = %cwd.display(), "failed to start dev watcher");
    }

    (
        DevWatchHandle {
            _debouncer: debouncer,
        },
        rx,
    )
}
