//! WebSocket upgrade handler and socket pump
//!
//! Accepts the upgrade, assigns the connection its transient identity, and
//! runs the send/receive task pair for the socket's lifetime. Inbound
//! messages are handled to completion, one at a time, so session mutation
//! needs no locking beyond the registry's own map.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;

use super::broadcast::Broadcaster;
use super::connection::{ConnectionId, ConnectionManager};
use super::messages::{ClientMessage, ErrorPayload, ServerMessage};
use super::registry::SessionRegistry;
use super::sync::SessionHandler;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(connections): Extension<ConnectionManager>,
    Extension(registry): Extension<SessionRegistry>,
    Extension(config): Extension<Arc<Config>>,
    headers: HeaderMap,
) -> Response {
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let connection_id: ConnectionId = Uuid::new_v4();

    tracing::info!(
        connection_id = %connection_id,
        user_agent = user_agent.as_deref().unwrap_or("unknown"),
        "WebSocket connection accepted"
    );

    let max_listeners = config.max_listeners;
    ws.on_upgrade(move |socket| {
        handle_socket(socket, connection_id, connections, registry, max_listeners)
    })
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    connection_id: ConnectionId,
    connections: ConnectionManager,
    registry: SessionRegistry,
    max_listeners: usize,
) {
    // Create unbounded channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    connections.add_connection(connection_id, tx);

    // Split the socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Tell the client its transient identity
    let connected = ServerMessage::Connected { connection_id };
    if let Ok(json) = serde_json::to_string(&connected) {
        if ws_sender.send(Message::Text(json)).await.is_err() {
            tracing::warn!(
                connection_id = %connection_id,
                "Failed to send connected message"
            );
            connections.remove_connection(connection_id);
            return;
        }
    }

    // Forward messages from the internal channel to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        tracing::debug!(connection_id = %connection_id, "WebSocket send failed");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                }
            }
        }
    });

    // Handle incoming messages
    let recv_connections = connections.clone();
    let mut handler = SessionHandler::new(
        connection_id,
        registry.clone(),
        Broadcaster::new(connections.clone()),
        max_listeners,
    );
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => handler.handle_message(msg),
                    Err(e) => {
                        tracing::debug!(
                            error = %e,
                            connection_id = %connection_id,
                            "Failed to parse client message"
                        );
                        let error = ErrorPayload::invalid_message(e.to_string());
                        let _ = recv_connections.send_to(connection_id, ServerMessage::Error(error));
                    }
                },
                Ok(Message::Binary(_)) => {
                    // Binary frames are not part of the session protocol
                    tracing::debug!(connection_id = %connection_id, "Received unsupported binary message");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    recv_connections.touch(connection_id);
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %connection_id, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, connection_id = %connection_id, "WebSocket error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, then abort the other
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    connections.remove_connection(connection_id);

    // Cascade teardown: host departure destroys the session, listener
    // departure updates membership
    let mut disconnect_handler = SessionHandler::new(
        connection_id,
        registry,
        Broadcaster::new(connections.clone()),
        max_listeners,
    );
    disconnect_handler.handle_disconnect();

    tracing::info!(
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}
