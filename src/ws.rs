//! Websocket transport: one task per connection, fed by a per-connection
//! outbound queue racing the inbound socket read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::commands::{dispatch, Command, Outbound};
use crate::AppState;

/// conn_id -> outbound sender, so a dispatch result for connection X can be
/// routed there from anywhere (including a different connection's task).
#[derive(Default)]
pub struct ConnectionRegistry {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, conn_id: String, tx: mpsc::UnboundedSender<Message>) {
        self.senders.lock().unwrap().insert(conn_id, tx);
    }

    pub(crate) fn remove(&self, conn_id: &str) {
        self.senders.lock().unwrap().remove(conn_id);
    }

    pub(crate) fn send_to(&self, conn_id: &str, msg: &Outbound) {
        let senders = self.senders.lock().unwrap();
        if let Some(tx) = senders.get(conn_id) {
            if let Ok(text) = serde_json::to_string(msg) {
                let _ = tx.send(Message::Text(text));
            }
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let conn_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.connections.insert(conn_id.clone(), tx);
    tracing::info!(%conn_id, "connection opened");

    let mut current_code: Option<String> = None;

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if socket.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Command>(&text) {
                            Ok(cmd) => {
                                let outbox = dispatch(
                                    &state.registry,
                                    &state.admin_password,
                                    &conn_id,
                                    current_code.as_deref(),
                                    cmd,
                                    Utc::now().timestamp_millis(),
                                );
                                for (to, msg) in &outbox {
                                    if to == &conn_id {
                                        if let Outbound::AdminAck { ok: true, code, .. } | Outbound::JoinAck { ok: true, code, .. } = msg {
                                            current_code = Some(code.clone());
                                        }
                                    }
                                    state.connections.send_to(to, msg);
                                }
                            }
                            Err(err) => {
                                tracing::debug!(%conn_id, %err, "ignoring malformed command");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(%conn_id, %err, "socket read error");
                        break;
                    }
                }
            }
        }
    }

    state.connections.remove(&conn_id);
    if let Some(code) = current_code {
        if let Some(session_lock) = state.registry.get(&code) {
            session_lock.lock().unwrap().disconnect(&conn_id);
        }
    }
    tracing::info!(%conn_id, "connection closed");
}
