//! WebSocket fan-out of server events
//!
//! Every client gets the JSON envelope `{"event", "projectId", "payload"}`.
//! A client that never subscribed receives everything; once it subscribes
//! to projects it only receives global events and events for those projects.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::broadcast::error::RecvError;

use super::ServerAppState;
use crate::events::ServerEvent;

/// Messages a client may send
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe { project_id: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { project_id: String },
    Ping,
}

/// Subscription filter of one connection
#[derive(Debug, Default)]
pub struct Subscriptions {
    projects: HashSet<String>,
}

impl Subscriptions {
    pub fn apply(&mut self, message: &ClientMessage) {
        match message {
            ClientMessage::Subscribe { project_id } => {
                self.projects.insert(project_id.clone());
            }
            ClientMessage::Unsubscribe { project_id } => {
                self.projects.remove(project_id);
            }
            ClientMessage::Ping => {}
        }
    }

    pub fn wants(&self, event: &ServerEvent) -> bool {
        if self.projects.is_empty() {
            return true;
        }
        match &event.project_id {
            None => true,
            Some(project_id) => self.projects.contains(project_id),
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerAppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_websocket(socket: WebSocket, state: ServerAppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = state.broadcaster.subscribe();
    let mut subscriptions = Subscriptions::default();

    log::info!("[WebSocket] Client connected");

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("[WebSocket] Client lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if !subscriptions.wants(&event) {
                    continue;
                }
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("[WebSocket] Failed to serialize event: {}", e),
                }
            }
            incoming = receiver.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        log::warn!("[WebSocket] Error: {}", e);
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Ping) => {
                            let pong = json!({ "type": "pong" }).to_string();
                            if sender.send(Message::Text(pong)).await.is_err() {
                                break;
                            }
                        }
                        Ok(message) => {
                            log::debug!("[WebSocket] {:?}", message);
                            subscriptions.apply(&message);
                        }
                        Err(e) => log::debug!("[WebSocket] Ignoring message {}: {}", text, e),
                    },
                    Message::Close(_) => break,
                    // Pings are answered by axum
                    _ => {}
                }
            }
        }
    }

    log::info!("[WebSocket] Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(project_id: Option<&str>) -> ServerEvent {
        ServerEvent {
            event: "agent:status".to_string(),
            project_id: project_id.map(str::to_string),
            payload: json!({}),
        }
    }

    #[test]
    fn test_client_message_parsing() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe","projectId":"p1"}"#)
                .unwrap(),
            ClientMessage::Subscribe {
                project_id: "p1".to_string()
            }
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn test_unsubscribed_client_gets_everything() {
        let subscriptions = Subscriptions::default();
        assert!(subscriptions.wants(&event(Some("p1"))));
        assert!(subscriptions.wants(&event(None)));
    }

    #[test]
    fn test_subscription_filtering() {
        let mut subscriptions = Subscriptions::default();
        subscriptions.apply(&ClientMessage::Subscribe {
            project_id: "p1".to_string(),
        });

        assert!(subscriptions.wants(&event(Some("p1"))));
        assert!(!subscriptions.wants(&event(Some("p2"))));
        assert!(subscriptions.wants(&event(None)));

        subscriptions.apply(&ClientMessage::Unsubscribe {
            project_id: "p1".to_string(),
        });
        assert!(subscriptions.wants(&event(Some("p2"))));
    }
}
