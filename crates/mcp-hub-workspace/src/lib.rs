//! Cross-process workspace cache and OAuth token storage (spec §4.7, §3).

pub mod cache;
pub mod lock;
pub mod oauth_store;
pub mod watch;

pub use cache::WorkspaceCache;
pub use lock::{acquire, CacheLock};
pub use oauth_store::OAuthStore;
pub use watch::watch_cache_file;
