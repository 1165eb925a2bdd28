//! `OAuthState` — per-server OAuth client registration and tokens (spec §3).
//!
//! Written only by the `ServerConnection` that owns the server name
//! (single-writer per server, spec §5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uris: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

/// Holds the live access/refresh token material (spec §3 OAuthState);
/// zeroized on drop so a moved-out or replaced `OAuthTokens` doesn't leave
/// secrets sitting in freed memory.
#[derive(Debug, Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[zeroize(skip)]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthTokens {
    pub fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|e| Utc::now() >= e)
    }

    pub fn expires_within(&self, buffer: chrono::Duration) -> bool {
        self.expiry.is_some_and(|e| Utc::now() + buffer >= e)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthState {
    pub server_name: String,
    pub client_registration: Option<ClientRegistration>,
    pub authorization_url: Option<String>,
    pub tokens: Option<OAuthTokens>,
}

impl OAuthState {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            client_registration: None,
            authorization_url: None,
            tokens: None,
        }
    }
}
