//! Placeholder resolution, JSONC config loading, and file watching for
//! MCP Hub (spec §4.1, §4.2).

pub mod loader;
pub mod placeholder;
pub mod watcher;

pub use loader::{infer_workspace_folder, ConfigLoader, Diff, LoadedConfig};
pub use placeholder::{ResolutionContext, ResolveError, Resolver};
pub use watcher::{watch, ReconcileEvent};
