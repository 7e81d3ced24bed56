//! Administrative HTTP endpoint (axum)
//!
//! - `POST /ban`: ban `{"agent": "<identity>"}` for the configured duration
//! - `GET /status`: online flag, own identity, tracked identity count

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::CameraAgent;

/// Body of `POST /ban`
#[derive(Debug, Deserialize)]
struct BanRequest {
    #[serde(default)]
    agent: Option<String>,
}

/// Build the admin router for `agent`.
pub fn router(agent: CameraAgent) -> Router {
    Router::new()
        .route("/ban", post(api_ban))
        .route("/status", get(api_status))
        .layer(TraceLayer::new_for_http())
        .with_state(agent)
}

/// Bind `bind` and serve until `agent` is stopped.
pub async fn start(agent: CameraAgent, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .context(format!("Failed to bind to {}", bind))?;

    info!("Ban requests can be sent to: http://{}/ban", bind);
    serve(agent, listener).await
}

/// Serve on an already-bound listener until `agent` is stopped.
pub async fn serve(agent: CameraAgent, listener: TcpListener) -> Result<()> {
    let shutdown = agent.clone();
    axum::serve(listener, router(agent))
        .with_graceful_shutdown(async move { shutdown.stopped().await })
        .await
        .context("Admin server error")?;
    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({
        "status": "error",
        "message": message.into(),
    });
    (status, Json(body)).into_response()
}

/// POST /ban: apply a ban through the same gate as message-channel bans
async fn api_ban(State(agent): State<CameraAgent>, body: Bytes) -> Response {
    let request: BanRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Malformed ban request");
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e));
        }
    };

    let Some(target) = request.agent else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'agent' field");
    };

    match agent.ban(&target).await {
        Ok(outcome) => {
            let body = json!({
                "status": "success",
                "message": format!("Agent {} has been banned", outcome.target),
                "agent": outcome.target,
                "ban_timeout": outcome.duration_ms,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) if e.is_client_error() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            error!(%target, error = %e, "Ban failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /status: agent status
async fn api_status(State(agent): State<CameraAgent>) -> Json<serde_json::Value> {
    let status = agent.status();
    Json(json!({
        "status": if status.online { "online" } else { "offline" },
        "online": status.online,
        "agent": status.identity,
        "tracked_identities": status.tracked_identities,
        "gate_busy": status.gate_busy,
        "stats": status.stats,
    }))
}
