//! Bridges [`mcp_hub_workspace::OAuthStore`] to rmcp's `CredentialStore`
//! trait, so the SDK's `AuthorizationManager` can load/save/clear tokens
//! through the hub's own flat-file storage (spec §3 `OAuthState`, §6
//! `<data-dir>/mcp-hub/oauth-storage.json`).

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use mcp_hub_core::domain::{ClientRegistration, OAuthState as DomainOAuthState};
use mcp_hub_workspace::OAuthStore;
use oauth2::{basic::BasicTokenType, AccessToken, EmptyExtraTokenFields, RefreshToken, StandardTokenResponse, TokenResponse};
use rmcp::transport::auth::{AuthError, CredentialStore, OAuthTokenResponse, StoredCredentials};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One instance per server name; `AuthorizationManager` calls `load()`
/// frequently, so a small cache avoids round-tripping the whole storage
/// file on every check.
pub struct HubCredentialStore {
    server_name: String,
    store: Arc<OAuthStore>,
    cache: RwLock<Option<StoredCredentials>>,
}

impl HubCredentialStore {
    pub fn new(server_name: impl Into<String>, store: Arc<OAuthStore>) -> Self {
        Self {
            server_name: server_name.into(),
            store,
            cache: RwLock::new(None),
        }
    }

    fn to_token_response(tokens: &mcp_hub_core::domain::OAuthTokens) -> OAuthTokenResponse {
        let mut response = StandardTokenResponse::new(
            AccessToken::new(tokens.access_token.clone()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        if let Some(refresh) = &tokens.refresh_token {
            response.set_refresh_token(Some(RefreshToken::new(refresh.clone())));
        }
        if let Some(expiry) = tokens.expiry {
            let remaining = (expiry - Utc::now()).num_seconds().max(0) as u64;
            response.set_expires_in(Some(&std::time::Duration::from_secs(remaining)));
        }
        response
    }

    fn from_token_response(token_response: &OAuthTokenResponse) -> mcp_hub_core::domain::OAuthTokens {
        mcp_hub_core::domain::OAuthTokens {
            access_token: token_response.access_token().secret().to_string(),
            refresh_token: token_response
                .refresh_token()
                .map(|t| t.secret().to_string()),
            expiry: token_response
                .expires_in()
                .map(|d| Utc::now() + ChronoDuration::seconds(d.as_secs() as i64)),
        }
    }
}

#[async_trait]
impl CredentialStore for HubCredentialStore {
    async fn load(&self) -> Result<Option<StoredCredentials>, AuthError> {
        if let Some(cached) = self.cache.read().await.clone() {
            return Ok(Some(cached));
        }

        let state = self
            .store
            .load(&self.server_name)
            .await
            .map_err(|err| AuthError::InternalError(err.to_string()))?;

        let stored = state.and_then(|state| {
            state.client_registration.map(|reg| StoredCredentials {
                client_id: reg.client_id,
                token_response: state.tokens.as_ref().map(Self::to_token_response),
            })
        });

        *self.cache.write().await = stored.clone();
        Ok(stored)
    }

    async fn save(&self, credentials: StoredCredentials) -> Result<(), AuthError> {
        let mut state = self
            .store
            .load(&self.server_name)
            .await
            .map_err(|err| AuthError::InternalError(err.to_string()))?
            .unwrap_or_else(|| DomainOAuthState::new(self.server_name.clone()));

        if !credentials.client_id.is_empty() {
            let redirect_uris = state
                .client_registration
                .as_ref()
                .map(|reg| reg.redirect_uris.clone())
                .unwrap_or_default();
            let registered_at = state
                .client_registration
                .as_ref()
                .map(|reg| reg.registered_at)
                .unwrap_or_else(Utc::now);
            state.client_registration = Some(ClientRegistration {
                client_id: credentials.client_id.clone(),
                client_secret: None,
                redirect_uris,
                registered_at,
            });
        }
        state.tokens = credentials
            .token_response
            .as_ref()
            .map(Self::from_token_response);

        self.store
            .save(state)
            .await
            .map_err(|err| AuthError::InternalError(err.to_string()))?;

        *self.cache.write().await = Some(credentials);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        self.store
            .clear(&self.server_name)
            .await
            .map_err(|err| AuthError::InternalError(err.to_string()))?;
        *self.cache.write().await = None;
        Ok(())
    }
}
