//! Session-scoped broadcast fan-out
//!
//! Every accepted host mutation and membership change produces exactly one
//! outbound event per other session member, excluding the originator.
//! Delivery is at-most-once and best-effort: no acknowledgement, no retry,
//! no event log. The session's own state fields remain the only durable
//! record of current truth.

use super::connection::{ConnectionId, ConnectionManager};
use super::messages::ServerMessage;

/// Fans server messages out to session members
#[derive(Debug, Clone)]
pub struct Broadcaster {
    connections: ConnectionManager,
}

impl Broadcaster {
    pub fn new(connections: ConnectionManager) -> Self {
        Self { connections }
    }

    /// Send `msg` to every member except `except`
    ///
    /// Returns the number of successful sends. Failed sends are logged and
    /// dropped; a dead receiver is cleaned up by its own connection task.
    pub fn to_members(
        &self,
        members: &[ConnectionId],
        except: Option<ConnectionId>,
        msg: ServerMessage,
    ) -> usize {
        let mut sent = 0;
        for &member in members {
            if Some(member) == except {
                continue;
            }
            match self.connections.send_to(member, msg.clone()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %member,
                        error = %e,
                        "Broadcast delivery failed"
                    );
                }
            }
        }
        sent
    }

    /// Send `msg` to a single member
    pub fn to_one(&self, conn: ConnectionId, msg: ServerMessage) {
        if let Err(e) = self.connections.send_to(conn, msg) {
            tracing::debug!(
                connection_id = %conn,
                error = %e,
                "Send failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn setup(n: usize) -> (
        Broadcaster,
        Vec<ConnectionId>,
        Vec<mpsc::UnboundedReceiver<ServerMessage>>,
    ) {
        let manager = ConnectionManager::new();
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..n {
            let id = Uuid::new_v4();
            let (tx, rx) = mpsc::unbounded_channel();
            manager.add_connection(id, tx);
            ids.push(id);
            receivers.push(rx);
        }
        (Broadcaster::new(manager), ids, receivers)
    }

    #[test]
    fn test_broadcast_excludes_originator() {
        let (broadcaster, ids, mut receivers) = setup(3);

        let sent = broadcaster.to_members(&ids, Some(ids[0]), ServerMessage::HostLeft);
        assert_eq!(sent, 2);

        assert!(receivers[0].try_recv().is_err());
        assert!(matches!(receivers[1].try_recv(), Ok(ServerMessage::HostLeft)));
        assert!(matches!(receivers[2].try_recv(), Ok(ServerMessage::HostLeft)));
    }

    #[test]
    fn test_broadcast_without_exclusion_reaches_all() {
        let (broadcaster, ids, mut receivers) = setup(2);

        let sent = broadcaster.to_members(&ids, None, ServerMessage::ListenerCount { n: 2 });
        assert_eq!(sent, 2);

        for rx in receivers.iter_mut() {
            assert!(matches!(
                rx.try_recv(),
                Ok(ServerMessage::ListenerCount { n: 2 })
            ));
        }
    }

    #[test]
    fn test_broadcast_skips_dead_member() {
        let (broadcaster, mut ids, mut receivers) = setup(2);

        // Drop one receiver so its channel is closed
        receivers.remove(0);
        ids.push(Uuid::new_v4()); // never registered at all

        let sent = broadcaster.to_members(&ids, None, ServerMessage::HeartbeatAck);
        assert_eq!(sent, 1);
        assert!(matches!(
            receivers[0].try_recv(),
            Ok(ServerMessage::HeartbeatAck)
        ));
    }
}
