//! WebSocket surface for live investigation progress.
//!
//! - `/ws/investigations/{id}` — watch one investigation; send
//!   `{"action": "start", "goal": "..."}` to begin a run, `{"action":
//!   "ping"}` to keep alive. Server frames are the serialized progress
//!   events (`started`/`turn`/`finding`/`lead`/`progress`/`completed`/
//!   `error`).
//! - `/ws/{org_id}` — multiplexed channel: `{"type": "subscribe",
//!   "channel": ...}`, `{"type": "ping"}`, and `{"type": "message",
//!   "content": ...}` where the content is a goal routed through the
//!   bridge.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

use crate::api::investigations::{spawn_investigation, InvestigationRequest};
use crate::bridge::SendFn;
use crate::investigations::{InvestigationStore, RunState};
use crate::state::AppState;

/// Constant-time token comparison via SHA-256 digests; hashing
/// normalizes lengths so `ct_eq` always compares 32 bytes.
fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /ws/investigations/{id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn investigation_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(inv_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_investigation_socket(socket, state, inv_id))
}

async fn handle_investigation_socket(socket: WebSocket, state: AppState, inv_id: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    // Writer task: single owner of the sink half.
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Forward structured progress events for this investigation.
    let mut events = state.bus.subscribe(&inv_id);
    let event_tx = tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Ok(frame) = serde_json::to_string(&event) else {
                continue;
            };
            if event_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_stream.next().await {
        let Message::Text(text) = message else {
            if matches!(message, Message::Close(_)) {
                break;
            }
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            let _ = tx.send(error_frame("invalid JSON")).await;
            continue;
        };

        match value.get("action").and_then(Value::as_str) {
            Some("start") => {
                let goal = value
                    .get("goal")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if goal.is_empty() {
                    let _ = tx.send(error_frame("missing 'goal' field")).await;
                    continue;
                }
                if let Some(record) = state.investigations.get(&inv_id).await {
                    if record.status == RunState::Running {
                        let _ = tx.send(error_frame("investigation already running")).await;
                        continue;
                    }
                }
                let req = InvestigationRequest {
                    goal,
                    max_turns: value
                        .get("max_turns")
                        .and_then(Value::as_u64)
                        .map(|n| n as u32)
                        .unwrap_or(state.config.agent.max_turns),
                    llm_provider: value
                        .get("llm_provider")
                        .and_then(Value::as_str)
                        .unwrap_or(&state.config.agent.llm_provider)
                        .to_string(),
                    auto_sanctions: state.config.agent.auto_sanctions_screen,
                    auto_news: state.config.agent.auto_news_check,
                    dry_run: false,
                };
                state
                    .investigations
                    .put(crate::investigations::InvestigationRecord::running(
                        &inv_id, &req.goal,
                    ))
                    .await;
                spawn_investigation(state.clone(), inv_id.clone(), req);
            }
            Some("ping") => {
                let _ = tx.send(r#"{"type":"pong"}"#.to_string()).await;
            }
            _ => {
                let _ = tx.send(error_frame("unknown action")).await;
            }
        }
    }

    forwarder.abort();
    writer.abort();
    tracing::debug!(investigation_id = %inv_id, "websocket disconnected");
}

fn error_frame(message: &str) -> String {
    serde_json::json!({ "type": "error", "message": message }).to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /ws/{org_id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn org_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    if let Some(expected) = &state.config.server.ws_token {
        let provided = query.token.as_deref().unwrap_or("");
        if !token_eq(provided, expected) {
            return (StatusCode::UNAUTHORIZED, "invalid or missing token").into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_org_socket(socket, state, org_id))
        .into_response()
}

async fn handle_org_socket(socket: WebSocket, state: AppState, org_id: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_stream.next().await {
        let Message::Text(text) = message else {
            if matches!(message, Message::Close(_)) {
                break;
            }
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            let _ = tx.send(error_frame("invalid JSON")).await;
            continue;
        };

        match value.get("type").and_then(Value::as_str) {
            Some("subscribe") => {
                let channel = value
                    .get("channel")
                    .and_then(Value::as_str)
                    .unwrap_or(&org_id);
                let _ = tx
                    .send(
                        serde_json::json!({ "type": "subscribed", "channel": channel })
                            .to_string(),
                    )
                    .await;
            }
            Some("ping") => {
                let _ = tx.send(r#"{"type":"pong"}"#.to_string()).await;
            }
            Some("message") => {
                let content = value
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if content.is_empty() {
                    let _ = tx.send(error_frame("missing 'content' field")).await;
                    continue;
                }
                let channel = value
                    .get("channel")
                    .and_then(Value::as_str)
                    .unwrap_or(&org_id)
                    .to_string();

                // Route through the bridge; frames go back over this
                // socket. Spawned so the read loop stays responsive.
                let bridge = state.bridge.clone();
                let frame_tx = tx.clone();
                let frame_channel = channel.clone();
                let send_fn: SendFn = Arc::new(move |text: String| {
                    let tx = frame_tx.clone();
                    let channel = frame_channel.clone();
                    Box::pin(async move {
                        let frame = serde_json::json!({
                            "type": "message",
                            "channel": channel,
                            "text": text,
                        })
                        .to_string();
                        let _ = tx.send(frame).await;
                    })
                });
                tokio::spawn(async move {
                    bridge
                        .handle_investigate_command(&content, &channel, send_fn)
                        .await;
                });
            }
            _ => {
                let _ = tx.send(error_frame("unknown message type")).await;
            }
        }
    }

    writer.abort();
    tracing::debug!(org_id = %org_id, "multiplexed websocket disconnected");
}
