//! Outbound OAuth wiring (spec §8 scenario 4), scoped to what can be
//! exercised without a live authorization server: a fresh manager has no
//! pending flow and no bearer token for an unknown server, and a token
//! already persisted in the OAuth store is handed back without requiring
//! network access as long as it isn't close to expiry.

use chrono::{Duration as ChronoDuration, Utc};
use mcp_hub_core::create_shared_event_bus;
use mcp_hub_core::domain::{OAuthState, OAuthTokens};
use mcp_hub_gateway::oauth::HubOAuthManager;
use mcp_hub_mcp::AuthProvider;
use std::sync::Arc;
use tests::TestWorkspace;

fn manager(workspace: &TestWorkspace) -> HubOAuthManager {
    let bus = create_shared_event_bus();
    let store = Arc::new(workspace.oauth_store());
    HubOAuthManager::new(store, "http://127.0.0.1:0", bus.sender())
}

#[tokio::test]
async fn fresh_manager_has_no_pending_flow_for_any_server() {
    let workspace = TestWorkspace::new();
    let manager = manager(&workspace);
    assert!(!manager.is_pending("github"));
}

#[tokio::test]
async fn bearer_token_is_none_when_nothing_is_stored() {
    let workspace = TestWorkspace::new();
    let manager = manager(&workspace);
    assert!(manager.bearer_token("github").await.is_none());
}

#[tokio::test]
async fn a_token_well_within_its_lifetime_is_returned_without_a_refresh() {
    let workspace = TestWorkspace::new();
    let store = workspace.oauth_store();

    let mut state = OAuthState::new("github");
    state.tokens = Some(OAuthTokens {
        access_token: "live-token".to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expiry: Some(Utc::now() + ChronoDuration::hours(1)),
    });
    store.save(state).await.unwrap();

    let manager = manager(&workspace);

    assert_eq!(
        manager.bearer_token("github").await,
        Some("live-token".to_string())
    );
}
