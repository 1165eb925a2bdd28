//! Outbound OAuth: the hub acting as an OAuth *client* against upstream MCP
//! servers (spec §4.3 `UNAUTHORIZED` state, §6 `/api/servers/authorize`,
//! `/oauth/callback`, `/oauth/manual_callback`).
//!
//! Grounded on rmcp's own `AuthorizationManager`/`OAuthState` machinery
//! (RFC 8414 metadata discovery, PKCE, dynamic client registration) rather
//! than hand-rolling any of that — this crate's job is only to plug a
//! [`HubCredentialStore`] into the SDK and to route a single pending flow
//! per server name, since the hub has no loopback callback server or
//! browser-opening helper (those are explicitly out of scope, spec §1):
//! the authorization URL is surfaced to the caller and the callback lands
//! directly on the hub's own axum routes.

use super::credential_store::HubCredentialStore;
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use mcp_hub_core::domain::ClientRegistration;
use mcp_hub_core::{log_event, EventSender, HubError, LogLevel};
use mcp_hub_mcp::auth::AuthProvider;
use mcp_hub_workspace::OAuthStore;
use rmcp::transport::auth::{
    AuthError, AuthorizationManager, AuthorizationSession, OAuthClientConfig, OAuthState,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const CLIENT_NAME: &str = "MCP Hub";
/// Tokens within this window of expiry are refreshed proactively rather
/// than waited out until the next failing call (supplemented ambient
/// feature: see SPEC_FULL.md "proactive token-refresh scheduling").
const REFRESH_WINDOW: ChronoDuration = ChronoDuration::seconds(300);

pub struct HubOAuthManager {
    store: Arc<OAuthStore>,
    base_url: String,
    /// One in-flight authorization dance per server name; a second
    /// `authorize` call before the first completes reuses the same
    /// session rather than starting a competing DCR registration.
    sessions: DashMap<String, Arc<Mutex<OAuthState>>>,
    /// Server URLs noted by the coordinator before each connect attempt,
    /// so `bearer_token` can build an `AuthorizationManager` to refresh
    /// without needing the URL threaded through the `AuthProvider` trait.
    server_urls: DashMap<String, String>,
    events: EventSender,
}

impl HubOAuthManager {
    pub fn new(store: Arc<OAuthStore>, base_url: impl Into<String>, events: EventSender) -> Self {
        Self {
            store,
            base_url: base_url.into(),
            sessions: DashMap::new(),
            server_urls: DashMap::new(),
            events,
        }
    }

    fn redirect_uri(&self, server_name: &str) -> String {
        format!(
            "{}/oauth/callback?server_name={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(server_name)
        )
    }

    pub fn note_server_url(&self, server_name: &str, server_url: &str) {
        self.server_urls
            .insert(server_name.to_string(), server_url.to_string());
    }

    async fn persist_redirect_uri(&self, server_name: &str, redirect_uri: &str) -> Result<(), HubError> {
        let mut state = self
            .store
            .load(server_name)
            .await?
            .unwrap_or_else(|| mcp_hub_core::domain::OAuthState::new(server_name));
        let client_id = state
            .client_registration
            .as_ref()
            .map(|reg| reg.client_id.clone())
            .unwrap_or_default();
        let registered_at = state
            .client_registration
            .as_ref()
            .map(|reg| reg.registered_at)
            .unwrap_or_else(chrono::Utc::now);
        state.client_registration = Some(ClientRegistration {
            client_id,
            client_secret: None,
            redirect_uris: vec![redirect_uri.to_string()],
            registered_at,
        });
        self.store.save(state).await
    }

    /// Begin (or resume) the OAuth dance for `server_name`, returning the
    /// URL the caller should visit (spec §4.3: produced during the failing
    /// connect attempt, never by opening a browser).
    pub async fn start_flow(&self, server_name: &str, server_url: &str) -> Result<String, HubError> {
        self.note_server_url(server_name, server_url);

        if let Some(existing) = self.sessions.get(server_name) {
            let mut state = existing.lock().await;
            return state
                .get_authorization_url()
                .await
                .map_err(|err| HubError::auth(format!("failed to get authorization url: {err}"), None));
        }

        let redirect_uri = self.redirect_uri(server_name);
        self.persist_redirect_uri(server_name, &redirect_uri).await?;

        let mut oauth_state = OAuthState::new(server_url, None)
            .await
            .map_err(|err| HubError::auth(format!("oauth metadata discovery failed: {err}"), None))?;

        if let OAuthState::Unauthorized(ref mut manager) = oauth_state {
            manager.set_credential_store(HubCredentialStore::new(server_name, self.store.clone()));
            let _ = manager.initialize_from_store().await;
        }

        let existing_client_id = self
            .store
            .load(server_name)
            .await
            .ok()
            .flatten()
            .and_then(|state| state.client_registration)
            .filter(|reg| !reg.client_id.is_empty())
            .map(|reg| reg.client_id);

        let scopes: Vec<&str> = Vec::new();

        oauth_state = if let (Some(client_id), OAuthState::Unauthorized(manager)) =
            (existing_client_id, oauth_state)
        {
            info!(server = %server_name, %client_id, "reusing existing OAuth client registration");
            self.configure_existing_client(manager, client_id, &scopes, &redirect_uri)
                .await?
        } else if let OAuthState::Unauthorized(manager) = oauth_state {
            info!(server = %server_name, "registering new OAuth client via dynamic client registration");
            OAuthState::Session(
                AuthorizationSession::new(manager, &scopes, &redirect_uri, Some(CLIENT_NAME), None)
                    .await
                    .map_err(|err| map_auth_error(server_name, err))?,
            )
        } else {
            oauth_state
        };

        let auth_url = oauth_state
            .get_authorization_url()
            .await
            .map_err(|err| HubError::auth(format!("failed to get authorization url: {err}"), None))?;

        self.sessions
            .insert(server_name.to_string(), Arc::new(Mutex::new(oauth_state)));
        self.events.emit(log_event(
            LogLevel::Info,
            "oauth_flow_started",
            format!("authorization required for {server_name}"),
        ));
        Ok(auth_url)
    }

    async fn configure_existing_client(
        &self,
        manager: AuthorizationManager,
        client_id: String,
        scopes: &[&str],
        redirect_uri: &str,
    ) -> Result<OAuthState, HubError> {
        let mut manager = manager;
        manager
            .configure_client(OAuthClientConfig {
                client_id,
                client_secret: None,
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
                redirect_uri: redirect_uri.to_string(),
            })
            .map_err(|err| HubError::auth(format!("failed to configure oauth client: {err}"), None))?;

        let auth_url = manager
            .get_authorization_url(scopes)
            .await
            .map_err(|err| HubError::auth(format!("failed to get authorization url: {err}"), None))?;

        Ok(OAuthState::Session(AuthorizationSession {
            auth_manager: manager,
            auth_url,
            redirect_uri: redirect_uri.to_string(),
        }))
    }

    /// Complete the dance for `server_name` once `/oauth/callback` (or
    /// `/oauth/manual_callback`) lands with a code (spec §6, §8 scenario 4).
    /// There is no shared `state` parameter to route by (this hub has no
    /// shared loopback server multiplexing flows), so pending sessions are
    /// keyed directly by server name and `state` is passed through as-is to
    /// the SDK's own verification.
    pub async fn handle_callback(
        &self,
        server_name: &str,
        code: &str,
        state: &str,
    ) -> Result<(), HubError> {
        let Some(entry) = self.sessions.get(server_name).map(|r| r.value().clone()) else {
            return Err(HubError::auth(
                "no pending authorization for this server".to_string(),
                None,
            ));
        };

        {
            let mut oauth_state = entry.lock().await;
            oauth_state
                .handle_callback(code, state)
                .await
                .map_err(|err| HubError::auth(format!("token exchange failed: {err}"), None))?;
        }

        self.sessions.remove(server_name);
        self.events.emit(log_event(
            LogLevel::Info,
            "oauth_flow_completed",
            format!("authorized {server_name}"),
        ));
        Ok(())
    }

    pub fn is_pending(&self, server_name: &str) -> bool {
        self.sessions.contains_key(server_name)
    }

    /// Proactively refresh any stored token within [`REFRESH_WINDOW`] of
    /// expiry for servers the coordinator has connected at least once.
    /// Invoked periodically by the coordinator's background loop.
    pub async fn refresh_expiring(&self) {
        for entry in self.server_urls.iter() {
            let server_name = entry.key().clone();
            let server_url = entry.value().clone();
            let Ok(Some(state)) = self.store.load(&server_name).await else {
                continue;
            };
            let Some(tokens) = state.tokens else { continue };
            if tokens.refresh_token.is_none() || !tokens.expires_within(REFRESH_WINDOW) {
                continue;
            }
            match AuthorizationManager::new(&server_url).await {
                Ok(mut manager) => {
                    manager.set_credential_store(HubCredentialStore::new(
                        server_name.clone(),
                        self.store.clone(),
                    ));
                    if manager.initialize_from_store().await.unwrap_or(false) {
                        if let Err(err) = manager.get_access_token().await {
                            warn!(server = %server_name, %err, "proactive token refresh failed");
                        } else {
                            info!(server = %server_name, "proactively refreshed oauth token");
                        }
                    }
                }
                Err(err) => warn!(server = %server_name, %err, "failed to build authorization manager for refresh"),
            }
        }
    }
}

fn map_auth_error(server_name: &str, err: AuthError) -> HubError {
    match err {
        AuthError::NoAuthorizationSupport => HubError::auth(
            format!("{server_name} does not support OAuth authorization"),
            None,
        ),
        other => HubError::auth(format!("dynamic client registration failed: {other}"), None),
    }
}

#[async_trait]
impl AuthProvider for HubOAuthManager {
    async fn bearer_token(&self, server_name: &str) -> Option<String> {
        let state = self.store.load(server_name).await.ok().flatten()?;
        let tokens = state.tokens?;
        if !tokens.expires_within(REFRESH_WINDOW) {
            return Some(tokens.access_token);
        }
        let server_url = self.server_urls.get(server_name)?.value().clone();
        let mut manager = AuthorizationManager::new(&server_url).await.ok()?;
        manager.set_credential_store(HubCredentialStore::new(server_name, self.store.clone()));
        manager.initialize_from_store().await.ok()?;
        manager.get_access_token().await.ok()
    }

    async fn authorization_url(&self, server_name: &str, server_url: &str) -> Option<String> {
        match self.start_flow(server_name, server_url).await {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(server = %server_name, %err, "failed to start oauth flow");
                None
            }
        }
    }
}
