//! Management API handlers (spec §6).

use super::envelope::ok;
use super::error::{ApiError, ApiResult};
use super::state::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use mcp_hub_core::HubError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Deserialize)]
pub struct ServerNameBody {
    pub server_name: String,
}

#[derive(Deserialize)]
pub struct StopQuery {
    #[serde(default)]
    pub disable: bool,
}

#[derive(Deserialize)]
pub struct ToolCallBody {
    pub server_name: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub request_options: Option<Value>,
}

#[derive(Deserialize)]
pub struct ResourceReadBody {
    pub server_name: String,
    pub uri: String,
    #[serde(default)]
    pub request_options: Option<Value>,
}

#[derive(Deserialize)]
pub struct PromptGetBody {
    pub server_name: String,
    pub prompt: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub request_options: Option<Value>,
}

#[derive(Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub server_name: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Deserialize)]
pub struct ManualCallbackBody {
    pub url: String,
}

pub async fn health(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let servers = state.coordinator.all_views().await;
    let connected = servers
        .iter()
        .filter(|s| s.status == mcp_hub_core::ConnectionStatus::Connected)
        .count();
    let total = servers.len();
    let workspaces = state
        .workspaces
        .read()
        .await
        .map_err(ApiError::from)?
        .into_values()
        .collect::<Vec<_>>();
    Ok(ok(json!({
        "hub_state": state.coordinator.hub_state().await,
        "servers": servers,
        "connection_stats": { "connected": connected, "total": total },
        "workspaces": workspaces,
    })))
}

pub async fn list_servers(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.coordinator.all_views().await)
}

pub async fn server_info(
    State(state): State<AppState>,
    Json(body): Json<ServerNameBody>,
) -> ApiResult<impl IntoResponse> {
    let view = state.coordinator.view(&body.server_name).await?;
    Ok(ok(view))
}

pub async fn start_server(
    State(state): State<AppState>,
    Json(body): Json<ServerNameBody>,
) -> ApiResult<impl IntoResponse> {
    state.coordinator.start_server(&body.server_name).await?;
    Ok(ok(json!({ "server_name": body.server_name, "started": true })))
}

pub async fn stop_server(
    State(state): State<AppState>,
    Query(query): Query<StopQuery>,
    Json(body): Json<ServerNameBody>,
) -> ApiResult<impl IntoResponse> {
    state
        .coordinator
        .stop_server(&body.server_name, query.disable)
        .await?;
    Ok(ok(json!({ "server_name": body.server_name, "stopped": true })))
}

pub async fn refresh_server(
    State(state): State<AppState>,
    Json(body): Json<ServerNameBody>,
) -> ApiResult<impl IntoResponse> {
    state.coordinator.refresh_server(&body.server_name).await?;
    Ok(ok(json!({ "server_name": body.server_name, "refreshed": true })))
}

pub async fn refresh_all(State(state): State<AppState>) -> impl IntoResponse {
    state.coordinator.refresh_all().await;
    ok(json!({ "refreshed": true }))
}

pub async fn call_tool(
    State(state): State<AppState>,
    Json(body): Json<ToolCallBody>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .coordinator
        .call_tool(&body.server_name, &body.tool, body.arguments)
        .await?;
    Ok(ok(result))
}

pub async fn read_resource(
    State(state): State<AppState>,
    Json(body): Json<ResourceReadBody>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .coordinator
        .read_resource(&body.server_name, &body.uri)
        .await?;
    Ok(ok(result))
}

pub async fn get_prompt(
    State(state): State<AppState>,
    Json(body): Json<PromptGetBody>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .coordinator
        .get_prompt(&body.server_name, &body.prompt, body.arguments)
        .await?;
    Ok(ok(result))
}

pub async fn authorize_server(
    State(state): State<AppState>,
    Json(body): Json<ServerNameBody>,
) -> ApiResult<impl IntoResponse> {
    let server_url = state.coordinator.server_url(&body.server_name).await?;
    let url = state
        .coordinator
        .oauth()
        .start_flow(&body.server_name, &server_url)
        .await?;
    Ok(ok(json!({ "authorization_url": url })))
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> impl IntoResponse {
    match state
        .coordinator
        .oauth()
        .handle_callback(&query.server_name, &query.code, query.state.as_deref().unwrap_or(""))
        .await
    {
        Ok(()) => {
            let _ = state.coordinator.refresh_server(&query.server_name).await;
            axum::response::Html(
                "<html><body><h3>Authorization complete.</h3>\
                 You can close this tab and return to your client.</body></html>"
                    .to_string(),
            )
            .into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

pub async fn oauth_manual_callback(
    State(state): State<AppState>,
    Json(body): Json<ManualCallbackBody>,
) -> ApiResult<impl IntoResponse> {
    let url = url::Url::parse(&body.url)
        .map_err(|err| HubError::validation(format!("invalid callback url: {err}")))?;
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let code = params
        .get("code")
        .ok_or_else(|| HubError::validation("callback url missing 'code'"))?;
    let server_name = params
        .get("server_name")
        .ok_or_else(|| HubError::validation("callback url missing 'server_name'"))?;
    let state_param = params.get("state").map(String::as_str).unwrap_or("");

    state
        .coordinator
        .oauth()
        .handle_callback(server_name, code, state_param)
        .await?;
    let _ = state.coordinator.refresh_server(server_name).await;
    Ok(ok(json!({ "server_name": server_name, "authorized": true })))
}

pub async fn restart(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.coordinator.restart().await?;
    Ok(ok(json!({ "restarted": true })))
}

pub async fn hard_restart(State(state): State<AppState>) -> impl IntoResponse {
    state.shutdown.cancel();
    ok(json!({ "shutting_down": true }))
}

pub async fn workspaces(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let entries = state.workspaces.read().await?.into_values().collect::<Vec<_>>();
    Ok(ok(entries))
}
