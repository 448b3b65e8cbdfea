use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::storage::AgentRepository;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const POLICY_VIOLATION_CODE: u16 = 1008;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Auth { #[serde(rename = "agentId")] agent_id: String, #[serde(rename = "apiKey")] api_key: String },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    Error { message: &'a str },
    Connected { #[serde(rename = "agentId")] agent_id: &'a str, message: &'a str },
    Pong { timestamp: i64 },
}

/// Per-agent authenticated WebSocket connection table, mutated only by
/// the gateway itself.
pub struct WsGateway {
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
}

impl WsGateway {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Drives one accepted connection through the auth handshake and the
    /// message loop until close.
    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket, agents: Arc<dyn AgentRepository>) {
        let (mut sink, mut stream) = socket.split();

        let agent_id = match tokio::time::timeout(AUTH_TIMEOUT, Self::authenticate(&mut stream, &mut sink, &agents)).await {
            Ok(Some(agent_id)) => agent_id,
            Ok(None) => return,
            Err(_) => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: POLICY_VIOLATION_CODE,
                        reason: "auth timeout".into(),
                    })))
                    .await;
                return;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(agent_id.clone(), tx);
        info!(%agent_id, "agent websocket connected");

        let forward_agent_id = agent_id.clone();
        let forward_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            forward_agent_id
        });

        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => self.handle_message(&agent_id, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }

        self.connections.write().await.remove(&agent_id);
        forward_task.abort();
        info!(%agent_id, "agent websocket disconnected");
    }

    async fn authenticate(
        stream: &mut futures::stream::SplitStream<WebSocket>,
        sink: &mut futures::stream::SplitSink<WebSocket, Message>,
        agents: &Arc<dyn AgentRepository>,
    ) -> Option<String> {
        while let Some(Ok(message)) = stream.next().await {
            let Message::Text(text) = message else { continue };
            let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
            match parsed {
                Ok(ClientMessage::Auth { agent_id, api_key }) => {
                    let resolved = agents.get_by_api_key(&api_key).await.ok().flatten();
                    match resolved {
                        Some(agent) if agent.id.to_string() == agent_id => {
                            let _ = sink
                                .send(Self::encode(&ServerMessage::Connected {
                                    agent_id: &agent_id,
                                    message: "authenticated",
                                }))
                                .await;
                            return Some(agent_id);
                        }
                        _ => {
                            let _ = sink
                                .send(Self::encode(&ServerMessage::Error {
                                    message: "invalid agentId or apiKey",
                                }))
                                .await;
                            let _ = sink
                                .send(Message::Close(Some(CloseFrame {
                                    code: POLICY_VIOLATION_CODE,
                                    reason: "authentication failed".into(),
                                })))
                                .await;
                            return None;
                        }
                    }
                }
                _ => {
                    let _ = sink
                        .send(Self::encode(&ServerMessage::Error {
                            message: "first message must be auth",
                        }))
                        .await;
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: POLICY_VIOLATION_CODE,
                            reason: "authentication required".into(),
                        })))
                        .await;
                    return None;
                }
            }
        }
        None
    }

    async fn handle_message(&self, agent_id: &str, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Ping) => {
                let payload = ServerMessage::Pong {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                };
                self.send_to(agent_id, &payload).await;
            }
            Ok(ClientMessage::Auth { .. }) => {
                warn!(%agent_id, "ignoring duplicate auth message");
            }
            Err(_) => {
                warn!(%agent_id, "ignoring message of unknown type");
            }
        }
    }

    async fn send_to(&self, agent_id: &str, payload: &ServerMessage<'_>) {
        let connections = self.connections.read().await;
        if let Some(tx) = connections.get(agent_id) {
            let _ = tx.send(Self::encode(payload));
        }
    }

    fn encode(payload: &ServerMessage<'_>) -> Message {
        Message::Text(serde_json::to_string(payload).unwrap_or_default())
    }

    /// Returns true iff a live registered socket existed for `agent_id`
    /// and the send did not fail; a dead entry is pruned on failure.
    pub async fn broadcast_alert(&self, agent_id: &str, payload: serde_json::Value) -> bool {
        let message = Message::Text(json!({ "type": "price_alert", "data": payload }).to_string());
        let sent = {
            let connections = self.connections.read().await;
            connections.get(agent_id).map(|tx| tx.send(message).is_ok())
        };

        match sent {
            Some(true) => true,
            Some(false) => {
                self.connections.write().await.remove(agent_id);
                false
            }
            None => false,
        }
    }

    pub async fn is_connected(&self, agent_id: &str) -> bool {
        self.connections.read().await.contains_key(agent_id)
    }

    /// Closes every connection with a "server shutdown" code.
    pub async fn shutdown(&self) {
        let mut connections = self.connections.write().await;
        for (_, tx) in connections.drain() {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: 1001,
                reason: "server shutdown".into(),
            })));
        }
    }
}

impl Default for WsGateway {
    fn default() -> Self {
        Self::new()
    }
}
