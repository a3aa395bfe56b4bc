//! HTTP transports: WebSocket sessions at `/ws/mcp` and a stateless REST
//! subset at `/api/v1/tools/{name}`.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use tmws_core::{Result, WireRequest, WireResponse};

use crate::session::IDLE_TIMEOUT;
use crate::state::ServerState;
use crate::wire::handle_frame;

/// Build the axum router for the HTTP transports.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws/mcp", get(ws_upgrade_handler))
        .route("/api/v1/tools/{name}", post(rest_tool_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<ServerState>, listen: &str) -> Result<()> {
    let router = build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "server listening");

    // Background sweeps: idle sessions and stale rate-limit buckets.
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            state.sessions.sweep_idle().await;
        }
    });

    axum::serve(listener, router).await?;
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tmws",
        "version": env!("CARGO_PKG_VERSION"),
        "open_sessions": state.sessions.count(),
        "uptime_secs": state.metrics.uptime_secs(),
    }))
}

async fn metrics_handler(State(state): State<Arc<ServerState>>) -> String {
    state.metrics.render(state.sessions.count())
}

async fn ws_upgrade_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = bearer_token(&headers);
    let agent = match state.session_agent(token.as_deref()) {
        Ok(agent) => agent,
        Err(e) => {
            warn!(error = %e, "websocket session refused");
            return (StatusCode::UNAUTHORIZED, e.wire_message()).into_response();
        }
    };
    ws.on_upgrade(move |socket| ws_session(state, socket, agent))
}

async fn ws_session(state: Arc<ServerState>, mut socket: WebSocket, agent: String) {
    let session = match state.sessions.open(&agent) {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "session limit reached, closing websocket");
            let _ = socket
                .send(Message::Text(
                    serde_json::to_string(&WireResponse::fail(0, &e))
                        .unwrap_or_default()
                        .into(),
                ))
                .await;
            return;
        }
    };
    let session_id = session.lock().await.id;
    info!(session = %session_id, agent = %agent, "websocket session started");

    // One loop per session: requests process strictly in arrival order.
    loop {
        let message = match tokio::time::timeout(IDLE_TIMEOUT, socket.recv()).await {
            Err(_) => {
                debug!(session = %session_id, "websocket idle timeout");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(_))) => break,
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let response = handle_frame(&state, &session, text.as_str()).await;
                let frame = match serde_json::to_string(&response) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol.
            _ => continue,
        }
    }

    state.sessions.close(session_id);
    info!(session = %session_id, "websocket session ended");
}

/// REST subset: one ephemeral session per call, no notifications.
async fn rest_tool_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(params): Json<Value>,
) -> Response {
    let token = bearer_token(&headers);
    let agent = match state.session_agent(token.as_deref()) {
        Ok(agent) => agent,
        Err(e) => return error_response(&e),
    };
    let session = match state.sessions.open(&agent) {
        Ok(session) => session,
        Err(e) => return error_response(&e),
    };
    let session_id = session.lock().await.id;

    let request = WireRequest {
        id: 0,
        tool: name,
        params,
    };
    let response = state
        .router
        .dispatch(Arc::clone(&state), Arc::clone(&session), request)
        .await;
    state.sessions.close(session_id);

    let status = match &response.error {
        None => StatusCode::OK,
        Some(err) => status_for(&err.code),
    };
    (status, Json(response)).into_response()
}

fn error_response(e: &tmws_core::TmwsError) -> Response {
    let response = WireResponse::fail(0, e);
    (status_for(e.wire_code()), Json(response)).into_response()
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "ErrValidation" => StatusCode::BAD_REQUEST,
        "ErrPermission" => StatusCode::FORBIDDEN,
        "ErrNotFound" | "ErrUnknownAgent" | "ErrUnknownTool" => StatusCode::NOT_FOUND,
        "ErrNameConflict" | "ErrDuplicateId" => StatusCode::CONFLICT,
        "ErrRateLimited" => StatusCode::TOO_MANY_REQUESTS,
        "ErrTimeout" => StatusCode::GATEWAY_TIMEOUT,
        "ErrEmbedder" | "ErrStorage" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
