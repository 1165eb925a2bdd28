//! Pluggable OAuth integration point.
//!
//! The OAuth subsystem (PKCE, dynamic client registration, token refresh,
//! storage) lives in the gateway crate; a `ServerConnection` only needs to
//! ask it for a bearer token and, once a connect attempt reveals that auth
//! is required, for an authorization URL to surface to the caller (spec
//! §4.3's "surface the authorization URL produced by the OAuth subsystem
//! during the failing attempt").

use async_trait::async_trait;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current bearer token for `server_name`, if one is stored and valid.
    async fn bearer_token(&self, server_name: &str) -> Option<String>;

    /// Begin (or resume) the OAuth dance for `server_name` at `server_url`,
    /// returning the URL the user should visit.
    async fn authorization_url(&self, server_name: &str, server_url: &str) -> Option<String>;
}

/// No-credentials provider, used when a connection has no OAuth wiring
/// (tests, or servers that never need it).
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn bearer_token(&self, _server_name: &str) -> Option<String> {
        None
    }

    async fn authorization_url(&self, _server_name: &str, _server_url: &str) -> Option<String> {
        None
    }
}

/// Heuristic used to classify a transport failure as "needs auth" vs. a
/// plain connection error, mirroring the signals a non-compliant server
/// might surface (status code in the message, `WWW-Authenticate`, etc.).
pub fn looks_like_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "401",
        "unauthorized",
        "invalid_token",
        "www-authenticate",
        "auth required",
        "missing or invalid",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_auth_failure_shapes() {
        assert!(looks_like_auth_error("HTTP 401 Unauthorized"));
        assert!(looks_like_auth_error("missing or invalid access token"));
        assert!(!looks_like_auth_error("connection refused"));
    }
}
