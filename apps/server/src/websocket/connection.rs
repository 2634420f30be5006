//! WebSocket connection management
//!
//! This module tracks every live connection in the process and owns the
//! per-connection outbound queue. Delivery through a handle is at-most-once
//! and fire-and-forget; a closed receiver simply drops the message.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::ServerMessage;

/// Transient per-connection identity, assigned at upgrade time
pub type ConnectionId = Uuid;

/// Handle for sending messages to a specific WebSocket connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Channel for sending messages to this connection
    pub sender: mpsc::UnboundedSender<ServerMessage>,

    /// When this connection was established (Unix timestamp ms)
    pub connected_at: i64,

    /// Last activity timestamp (atomic for thread-safe updates)
    pub last_activity: Arc<AtomicI64>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            sender,
            connected_at: now,
            last_activity: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Update last activity timestamp
    pub fn touch(&self) {
        self.last_activity
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Get last activity timestamp
    pub fn last_seen(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Send a message to this connection
    #[allow(clippy::result_large_err)]
    pub fn send(&self, msg: ServerMessage) -> Result<(), mpsc::error::SendError<ServerMessage>> {
        self.touch();
        self.sender.send(msg)
    }

    /// Check if the connection is still alive
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Manages all live WebSocket connections
///
/// Thread-safe structure for tracking connections across the process.
/// Uses DashMap for concurrent access without explicit locking.
/// Wrapped in Arc for cheap cloning.
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    /// Map of connection_id -> ConnectionHandle
    connections: Arc<DashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Add a new connection
    pub fn add_connection(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) {
        self.connections
            .insert(connection_id, ConnectionHandle::new(sender));

        tracing::debug!(
            connection_id = %connection_id,
            total = self.connections.len(),
            "Connection added"
        );
    }

    /// Remove a connection
    pub fn remove_connection(&self, connection_id: ConnectionId) -> bool {
        let removed = self.connections.remove(&connection_id).is_some();

        if removed {
            tracing::debug!(
                connection_id = %connection_id,
                total = self.connections.len(),
                "Connection removed"
            );
        }

        removed
    }

    /// Check if a connection is tracked
    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Send a message to a specific connection
    pub fn send_to(&self, connection_id: ConnectionId, msg: ServerMessage) -> Result<(), SendError> {
        let handle = self
            .connections
            .get(&connection_id)
            .ok_or(SendError::ConnectionNotFound)?;

        handle.send(msg).map_err(|_| SendError::ConnectionClosed)?;

        Ok(())
    }

    /// Update last activity timestamp for a connection
    ///
    /// Returns true if the connection was found and updated.
    pub fn touch(&self, connection_id: ConnectionId) -> bool {
        if let Some(handle) = self.connections.get(&connection_id) {
            handle.touch();
            return true;
        }
        false
    }

    /// Drop connections whose receiver is gone or that have shown no
    /// activity for longer than `max_idle_ms`
    ///
    /// Sends and received pings both count as activity, so only dead
    /// transports age out.
    pub fn cleanup_stale_connections(&self, max_idle_ms: i64) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let before = self.connections.len();

        self.connections.retain(|connection_id, handle| {
            let keep = handle.is_alive() && now - handle.last_seen() < max_idle_ms;
            if !keep {
                tracing::debug!(
                    connection_id = %connection_id,
                    "Stale connection dropped"
                );
            }
            keep
        });

        before - self.connections.len()
    }

    /// Total number of live connections
    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }
}

/// Error type for send operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    ConnectionNotFound,
    ConnectionClosed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::ConnectionNotFound => write!(f, "connection not found"),
            SendError::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for SendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_connection() {
        let manager = ConnectionManager::new();
        let id = Uuid::new_v4();

        let (tx, _rx) = mpsc::unbounded_channel();
        manager.add_connection(id, tx);

        assert!(manager.is_connected(id));
        assert_eq!(manager.total_connections(), 1);

        assert!(manager.remove_connection(id));
        assert!(!manager.is_connected(id));
        assert_eq!(manager.total_connections(), 0);
    }

    #[test]
    fn test_send_to_delivers() {
        let manager = ConnectionManager::new();
        let id = Uuid::new_v4();

        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.add_connection(id, tx);

        manager.send_to(id, ServerMessage::HeartbeatAck).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::HeartbeatAck)));
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let manager = ConnectionManager::new();
        let result = manager.send_to(Uuid::new_v4(), ServerMessage::HeartbeatAck);
        assert_eq!(result, Err(SendError::ConnectionNotFound));
    }

    #[test]
    fn test_cleanup_drops_closed_connections() {
        let manager = ConnectionManager::new();
        let live = Uuid::new_v4();
        let dead = Uuid::new_v4();

        let (live_tx, _live_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        manager.add_connection(live, live_tx);
        manager.add_connection(dead, dead_tx);
        drop(dead_rx);

        assert_eq!(manager.cleanup_stale_connections(60_000), 1);
        assert!(manager.is_connected(live));
        assert!(!manager.is_connected(dead));
    }

    #[test]
    fn test_cleanup_drops_idle_connections() {
        let manager = ConnectionManager::new();
        let idle = Uuid::new_v4();
        let active = Uuid::new_v4();

        let (idle_tx, _idle_rx) = mpsc::unbounded_channel();
        let (active_tx, _active_rx) = mpsc::unbounded_channel();
        manager.add_connection(idle, idle_tx);
        manager.add_connection(active, active_tx);

        let stale_stamp = chrono::Utc::now().timestamp_millis() - 120_000;
        manager
            .connections
            .get(&idle)
            .unwrap()
            .last_activity
            .store(stale_stamp, Ordering::Relaxed);

        assert_eq!(manager.cleanup_stale_connections(60_000), 1);
        assert!(!manager.is_connected(idle));
        assert!(manager.is_connected(active));
    }

    #[test]
    fn test_touch_refreshes_last_seen() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(tx);

        handle.last_activity.store(0, Ordering::Relaxed);
        handle.touch();

        let now = chrono::Utc::now().timestamp_millis();
        assert!(now - handle.last_seen() < 5_000);
    }

    #[test]
    fn test_send_to_closed_connection() {
        let manager = ConnectionManager::new();
        let id = Uuid::new_v4();

        let (tx, rx) = mpsc::unbounded_channel();
        manager.add_connection(id, tx);
        drop(rx);

        let result = manager.send_to(id, ServerMessage::HeartbeatAck);
        assert_eq!(result, Err(SendError::ConnectionClosed));
    }
}
