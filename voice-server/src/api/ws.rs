//! WebSocket handler hosting one [`SessionLoop`] per connection.

use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use voice_core::protocol::ClientMessage;
use voice_core::reasoning::ReasoningAdapter;
use voice_core::{new_session_id, ReasoningEvent, Session, ServerMessage, SessionLoop};

use super::AppState;

const HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 15;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main per-connection loop. Parses inbound client messages, drains the
/// session's timer and reasoning-adapter event channels, and serializes
/// every outbound [`ServerMessage`] it produces back onto the socket.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let session_id = new_session_id();
    state.sessions.register(session_id.clone());
    tracing::info!(session_id = %session_id, "session connected");

    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();
    let (reasoning_tx, mut reasoning_rx) = mpsc::unbounded_channel::<ReasoningEvent>();
    let reasoning = std::sync::Arc::new(
        voice_core::reasoning::ScriptedReasoningAdapter::new(reasoning_tx),
    ) as std::sync::Arc<dyn ReasoningAdapter>;

    let mut session_loop = SessionLoop::new(
        Session::new(session_id.clone()),
        reasoning,
        state.reflex.clone(),
        state.fallback.clone(),
        state.shared.clone(),
        timer_tx,
    );

    let idle_timeout = Duration::from_millis(state.shared.config.session_idle_timeout_ms);
    let mut last_activity = Instant::now();
    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_CHECK_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        state.sessions.touch(&session_id);
                        let outgoing = match serde_json::from_str::<Value>(&text) {
                            Err(err) => vec![ServerMessage::Error { error: err.to_string() }],
                            Ok(value) => match serde_json::from_value::<ClientMessage>(value) {
                                Ok(client_msg) => session_loop.handle_client_message(client_msg).await,
                                Err(err) => {
                                    tracing::warn!(session_id = %session_id, error = %err, "unknown or malformed client message");
                                    Vec::new()
                                }
                            },
                        };
                        if !send_all(&mut sender, outgoing).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Audio is carried base64-encoded inside text frames per
                        // the wire protocol; binary frames are not part of it.
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            Some(fired) = timer_rx.recv() => {
                let outgoing = session_loop.handle_timer_fired(fired);
                if !send_all(&mut sender, outgoing).await {
                    break;
                }
            }
            Some(event) = reasoning_rx.recv() => {
                let outgoing = session_loop.handle_reasoning_event(event);
                if !send_all(&mut sender, outgoing).await {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > idle_timeout {
                    tracing::info!(session_id = %session_id, "session idle timeout");
                    break;
                }
            }
        }
    }

    let _ = session_loop.handle_client_message(ClientMessage::SessionEnd).await;
    state.sessions.remove(&session_id);
    tracing::info!(session_id = %session_id, "session disconnected");
}

/// Serializes and sends every message in order; returns `false` if the
/// socket is gone so the caller can stop driving the connection.
async fn send_all<S>(sender: &mut S, messages: Vec<ServerMessage>) -> bool
where
    S: futures::Sink<Message> + Unpin,
{
    for message in messages {
        let Ok(json) = serde_json::to_string(&message) else {
            continue;
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            return false;
        }
    }
    true
}
