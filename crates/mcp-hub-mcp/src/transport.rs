//! Transport construction for one `ServerConnection` (spec §4.3 connect
//! procedure: stdio child process, or streamable-HTTP with a SSE fallback).

use crate::auth::{looks_like_auth_error, AuthProvider};
use crate::handler::{CapabilityChanged, Handler};
use mcp_hub_core::domain::TransportType;
use rmcp::service::RunningService;
use rmcp::transport::sse_client::SseClientConfig;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{
    ConfigureCommandExt, SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
};
use rmcp::{RoleClient, ServiceExt};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub type Session = RunningService<RoleClient, Handler>;

/// Transport connect timeout (spec §5: "5 min, to permit first-install
/// dependency fetches").
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(300);

pub enum ConnectOutcome {
    Connected {
        session: Session,
        transport_type: TransportType,
    },
    Unauthorized {
        authorization_url: Option<String>,
    },
    Failed(String),
}

/// Spawn the configured command as a child process and attach a
/// line-delimited JSON-RPC stdio transport to it.
pub async fn connect_stdio(
    server_name: &str,
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
    cwd: Option<&str>,
    notify: mpsc::UnboundedSender<CapabilityChanged>,
) -> ConnectOutcome {
    info!(server = server_name, command, "connecting stdio server");

    let command_owned = command.to_string();
    let args_owned = args.to_vec();
    let env_owned = env.clone();
    let cwd_owned = cwd.map(str::to_string);

    let built = TokioChildProcess::new(Command::new(&command_owned).configure(move |cmd| {
        cmd.args(&args_owned).envs(&env_owned).stderr(Stdio::piped()).kill_on_drop(true);
        if let Some(cwd) = &cwd_owned {
            cmd.current_dir(cwd);
        }
        // rmcp does not hand the piped stderr handle back to the caller once
        // the child is wrapped, so per-line warn-level forwarding isn't
        // possible with the stock transport; stderr is at least not
        // discarded via `Stdio::null()` as it would otherwise be.
    }));

    let transport = match built {
        Ok(t) => t,
        Err(err) => return ConnectOutcome::Failed(format!("failed to spawn `{command}`: {err}")),
    };

    let handler = Handler::new(server_name, notify);
    match tokio::time::timeout(CONNECT_TIMEOUT, handler.serve(transport)).await {
        Ok(Ok(session)) => ConnectOutcome::Connected {
            session,
            transport_type: TransportType::Stdio,
        },
        Ok(Err(err)) => ConnectOutcome::Failed(format!("stdio handshake failed: {err}")),
        Err(_) => ConnectOutcome::Failed(format!("connect timeout after {CONNECT_TIMEOUT:?}")),
    }
}

/// Streamable-HTTP first, SSE fallback on a non-auth failure (spec §4.3).
pub async fn connect_remote(
    server_name: &str,
    url: &str,
    headers: &HashMap<String, String>,
    auth: &dyn AuthProvider,
    notify: mpsc::UnboundedSender<CapabilityChanged>,
) -> ConnectOutcome {
    if let Err(err) = reqwest::Url::parse(url) {
        return ConnectOutcome::Failed(format!("invalid url `{url}`: {err}"));
    }

    let bearer = auth.bearer_token(server_name).await;

    match try_streamable_http(server_name, url, headers, bearer.as_deref(), notify.clone()).await {
        ConnectOutcome::Failed(err) if looks_like_auth_error(&err) => {
            warn!(server = server_name, %err, "server requires authorization");
            let authorization_url = auth.authorization_url(server_name, url).await;
            ConnectOutcome::Unauthorized { authorization_url }
        }
        ConnectOutcome::Failed(err) => {
            warn!(server = server_name, %err, "streamable-HTTP failed, falling back to SSE");
            match try_sse(server_name, url, headers, bearer.as_deref(), notify).await {
                ConnectOutcome::Failed(sse_err) if looks_like_auth_error(&sse_err) => {
                    let authorization_url = auth.authorization_url(server_name, url).await;
                    ConnectOutcome::Unauthorized { authorization_url }
                }
                other => other,
            }
        }
        other => other,
    }
}

fn build_client(
    headers: &HashMap<String, String>,
    bearer: Option<&str>,
) -> Result<reqwest::Client, String> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        let name = reqwest::header::HeaderName::try_from(key.as_str())
            .map_err(|err| format!("invalid header name `{key}`: {err}"))?;
        let val = reqwest::header::HeaderValue::from_str(value)
            .map_err(|err| format!("invalid header value for `{key}`: {err}"))?;
        header_map.insert(name, val);
    }
    if let Some(token) = bearer {
        let val = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| format!("invalid bearer token: {err}"))?;
        header_map.insert(reqwest::header::AUTHORIZATION, val);
    }
    reqwest::Client::builder()
        .default_headers(header_map)
        .build()
        .map_err(|err| format!("failed to build http client: {err}"))
}

async fn try_streamable_http(
    server_name: &str,
    url: &str,
    headers: &HashMap<String, String>,
    bearer: Option<&str>,
    notify: mpsc::UnboundedSender<CapabilityChanged>,
) -> ConnectOutcome {
    let client = match build_client(headers, bearer) {
        Ok(c) => c,
        Err(err) => return ConnectOutcome::Failed(err),
    };
    let config = StreamableHttpClientTransportConfig::with_uri(url);
    let transport = StreamableHttpClientTransport::with_client(client, config);
    let handler = Handler::new(server_name, notify);

    match tokio::time::timeout(CONNECT_TIMEOUT, handler.serve(transport)).await {
        Ok(Ok(session)) => ConnectOutcome::Connected {
            session,
            transport_type: TransportType::StreamableHttp,
        },
        Ok(Err(err)) => ConnectOutcome::Failed(format!("streamable-HTTP connect failed: {err}")),
        Err(_) => ConnectOutcome::Failed(format!("connect timeout after {CONNECT_TIMEOUT:?}")),
    }
}

async fn try_sse(
    server_name: &str,
    url: &str,
    headers: &HashMap<String, String>,
    bearer: Option<&str>,
    notify: mpsc::UnboundedSender<CapabilityChanged>,
) -> ConnectOutcome {
    let client = match build_client(headers, bearer) {
        Ok(c) => c,
        Err(err) => return ConnectOutcome::Failed(err),
    };
    let config = SseClientConfig {
        sse_endpoint: url.to_string().into(),
        ..Default::default()
    };
    let transport = match SseClientTransport::start_with_client(client, config).await {
        Ok(t) => t,
        Err(err) => return ConnectOutcome::Failed(format!("SSE transport setup failed: {err}")),
    };
    let handler = Handler::new(server_name, notify);

    match tokio::time::timeout(CONNECT_TIMEOUT, handler.serve(transport)).await {
        Ok(Ok(session)) => ConnectOutcome::Connected {
            session,
            transport_type: TransportType::Sse,
        },
        Ok(Err(err)) => ConnectOutcome::Failed(format!("SSE connect failed: {err}")),
        Err(_) => ConnectOutcome::Failed(format!("connect timeout after {CONNECT_TIMEOUT:?}")),
    }
}
