//! Per-connection session message handling
//!
//! One `SessionHandler` exists per WebSocket connection and processes its
//! inbound messages to completion, one at a time. It routes session
//! creation and joins through the registry, answers clock-sync pings
//! inline, applies host-authorized playback mutations, and cascades
//! connection teardown into membership and session-liveness updates.
//!
//! Unauthorized mutation attempts are rejected silently: state is left
//! untouched and the sender gets no error. The rejection is logged at
//! debug for diagnosis.

use super::broadcast::Broadcaster;
use super::connection::ConnectionId;
use super::messages::{
    ClientMessage, CreateSessionReply, JoinSessionReply, ServerMessage, SessionErrorCode, TrackInfo,
};
use super::registry::{LeaveOutcome, RegistryError, SessionRegistry};

/// Handles session protocol messages for a single connection
pub struct SessionHandler {
    conn_id: ConnectionId,
    registry: SessionRegistry,
    broadcaster: Broadcaster,
    max_listeners: usize,
    /// Code of the session this connection created or joined, if any
    session_code: Option<String>,
}

impl SessionHandler {
    pub fn new(
        conn_id: ConnectionId,
        registry: SessionRegistry,
        broadcaster: Broadcaster,
        max_listeners: usize,
    ) -> Self {
        Self {
            conn_id,
            registry,
            broadcaster,
            max_listeners,
            session_code: None,
        }
    }

    /// Handle an incoming client message
    pub fn handle_message(&mut self, message: ClientMessage) {
        match message {
            // The clock exchange is answered inline, never queued behind
            // session work: t1 is read at the moment of handling.
            ClientMessage::ClockPing { t0 } => {
                let t1 = chrono::Utc::now().timestamp_millis();
                self.send_to_self(ServerMessage::ClockPong { t0, t1 });
            }
            ClientMessage::Heartbeat => {
                self.send_to_self(ServerMessage::HeartbeatAck);
            }
            ClientMessage::CreateSession { name } => self.handle_create(&name),
            ClientMessage::JoinSession { code } => self.handle_join(&code),
            ClientMessage::SetTrack {
                source_ref,
                title,
                host_token,
            } => self.handle_set_track(source_ref, title, &host_token),
            ClientMessage::Play {
                position_secs,
                server_play_at,
                host_token,
            } => self.handle_play(position_secs, server_play_at, &host_token),
            ClientMessage::Pause {
                position_secs,
                host_token,
            } => self.handle_pause(position_secs, &host_token),
            ClientMessage::Seek {
                position_secs,
                resume_playing,
                server_play_at,
                host_token,
            } => self.handle_seek(position_secs, resume_playing, server_play_at, &host_token),
        }
    }

    fn handle_create(&mut self, name: &str) {
        // A connection belongs to at most one session; detach first
        self.detach();

        let reply = match self.registry.create(name, self.conn_id) {
            Ok(created) => {
                self.session_code = Some(created.code.clone());
                CreateSessionReply::ok(created.code, created.name, created.host_token)
            }
            Err(RegistryError::Collision) => CreateSessionReply::err(SessionErrorCode::Collision),
            Err(e) => {
                // create only fails on collision; anything else is a bug
                tracing::error!(error = %e, "Unexpected create failure");
                CreateSessionReply::err(SessionErrorCode::Collision)
            }
        };

        self.send_to_self(ServerMessage::CreateSessionReply(reply));
    }

    fn handle_join(&mut self, code: &str) {
        self.detach();

        match self.registry.join(code, self.conn_id, self.max_listeners) {
            Ok(joined) => {
                self.session_code = Some(joined.code.clone());

                tracing::info!(
                    code = %joined.code,
                    connection_id = %self.conn_id,
                    listeners = joined.listener_count,
                    "Listener joined"
                );

                // Synchronous snapshot so a late joiner converges on the
                // same timeline as earlier joiners
                self.send_to_self(ServerMessage::JoinSessionReply(JoinSessionReply::ok(
                    joined.name,
                    joined.track,
                    joined.state,
                )));

                self.broadcaster.to_one(
                    joined.host_conn,
                    ServerMessage::ListenerJoined { id: self.conn_id },
                );
                self.broadcaster.to_members(
                    &joined.members,
                    Some(self.conn_id),
                    ServerMessage::ListenerCount {
                        n: joined.listener_count,
                    },
                );
            }
            Err(RegistryError::NotFound) => {
                self.send_to_self(ServerMessage::JoinSessionReply(JoinSessionReply::err(
                    SessionErrorCode::NotFound,
                )));
            }
            Err(RegistryError::Capacity) => {
                self.send_to_self(ServerMessage::JoinSessionReply(JoinSessionReply::err(
                    SessionErrorCode::Capacity,
                )));
            }
            Err(e) => {
                tracing::error!(error = %e, "Unexpected join failure");
                self.send_to_self(ServerMessage::JoinSessionReply(JoinSessionReply::err(
                    SessionErrorCode::NotFound,
                )));
            }
        }
    }

    fn handle_set_track(&self, source_ref: String, title: String, host_token: &str) {
        let track = TrackInfo { source_ref, title };
        self.host_mutation(host_token, |session| {
            session.set_track(track.clone());
            ServerMessage::TrackSet(track)
        });
    }

    fn handle_play(&self, position_secs: f64, server_play_at: i64, host_token: &str) {
        self.host_mutation(host_token, |session| {
            session.play(position_secs, server_play_at);
            ServerMessage::Play {
                position_secs,
                server_play_at,
            }
        });
    }

    fn handle_pause(&self, position_secs: f64, host_token: &str) {
        self.host_mutation(host_token, |session| {
            session.pause(position_secs);
            ServerMessage::Pause { position_secs }
        });
    }

    fn handle_seek(
        &self,
        position_secs: f64,
        resume_playing: bool,
        server_play_at: Option<i64>,
        host_token: &str,
    ) {
        self.host_mutation(host_token, |session| {
            session.seek(position_secs, resume_playing, server_play_at);
            ServerMessage::Seek {
                position_secs,
                resume_playing,
                server_play_at: session.state.server_play_at,
            }
        });
    }

    /// Apply a mutation if `host_token` proves host privilege, then fan
    /// the resulting event out to the other session members
    ///
    /// Authorization is by capability token, not transport identity, so a
    /// reconnected host can keep driving its session. Failed checks mutate
    /// nothing and answer nothing.
    fn host_mutation(
        &self,
        host_token: &str,
        mutate: impl FnOnce(&mut super::session::Session) -> ServerMessage,
    ) {
        let Some(code) = self.session_code.as_deref() else {
            tracing::debug!(
                connection_id = %self.conn_id,
                "Mutation from connection outside any session rejected"
            );
            return;
        };

        let broadcast = self.registry.with_session_mut(code, |session| {
            if !session.is_host_token(host_token) {
                tracing::debug!(
                    code = %session.code,
                    connection_id = %self.conn_id,
                    "Unauthorized mutation rejected"
                );
                return None;
            }
            let event = mutate(session);
            Some((event, session.members().collect::<Vec<_>>()))
        });

        if let Some(Some((event, members))) = broadcast {
            self.broadcaster
                .to_members(&members, Some(self.conn_id), event);
        }
    }

    /// Cascade connection teardown into session state
    ///
    /// Host departure destroys the session and notifies every remaining
    /// listener exactly once; listener departure updates membership and the
    /// listener count. No host succession occurs.
    pub fn handle_disconnect(&mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        self.session_code = None;

        match self.registry.leave(self.conn_id) {
            Some(LeaveOutcome::HostLeft { code, listeners }) => {
                tracing::info!(
                    code = %code,
                    listeners = listeners.len(),
                    "Broadcasting host departure"
                );
                self.broadcaster
                    .to_members(&listeners, None, ServerMessage::HostLeft);
            }
            Some(LeaveOutcome::ListenerLeft {
                host_conn,
                listener_count,
                members,
                ..
            }) => {
                self.broadcaster
                    .to_one(host_conn, ServerMessage::ListenerLeft { id: self.conn_id });
                self.broadcaster.to_members(
                    &members,
                    Some(self.conn_id),
                    ServerMessage::ListenerCount { n: listener_count },
                );
            }
            None => {}
        }
    }

    /// Send a message to this connection
    fn send_to_self(&self, msg: ServerMessage) {
        self.broadcaster.to_one(self.conn_id, msg);
    }
}
