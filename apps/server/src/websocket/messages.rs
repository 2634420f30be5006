//! WebSocket message types for the session protocol
//!
//! This module defines the message protocol for client-server communication
//! over WebSocket connections. Messages are serialized as JSON with a
//! tagged-variant envelope so every event name carries a fixed, typed payload.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Create a new session and become its host
    CreateSession { name: String },

    /// Join an existing session as a listener
    JoinSession { code: String },

    /// Clock-sync probe; `t0` is the client's local clock reading
    ClockPing { t0: i64 },

    /// Heartbeat to keep the connection alive
    Heartbeat,

    /// Set the session's current track (host-only)
    SetTrack {
        source_ref: String,
        title: String,
        host_token: String,
    },

    /// Start playback at `server_play_at` (host-only)
    Play {
        position_secs: f64,
        server_play_at: i64,
        host_token: String,
    },

    /// Pause playback (host-only)
    Pause {
        position_secs: f64,
        host_token: String,
    },

    /// Seek, optionally resuming playback (host-only)
    Seek {
        position_secs: f64,
        resume_playing: bool,
        server_play_at: Option<i64>,
        host_token: String,
    },
}

// =============================================================================
// Server -> Client Messages
// =============================================================================

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Connection established; the server-assigned transient identity
    Connected { connection_id: Uuid },

    /// Reply to CreateSession
    CreateSessionReply(CreateSessionReply),

    /// Reply to JoinSession
    JoinSessionReply(JoinSessionReply),

    /// Clock-sync echo: `t0` unchanged, `t1` read at handling time
    ClockPong { t0: i64, t1: i64 },

    /// Heartbeat response
    HeartbeatAck,

    /// A listener joined the session (sent to the host)
    ListenerJoined { id: Uuid },

    /// A listener left the session (sent to the host)
    ListenerLeft { id: Uuid },

    /// Updated listener count (sent to the whole session)
    ListenerCount { n: usize },

    /// The host set a new track
    TrackSet(TrackInfo),

    /// Playback starts at the given server-wall-clock instant
    Play {
        position_secs: f64,
        server_play_at: i64,
    },

    /// Playback paused
    Pause { position_secs: f64 },

    /// Position changed, optionally resuming playback
    Seek {
        position_secs: f64,
        resume_playing: bool,
        server_play_at: Option<i64>,
    },

    /// The host disconnected; the session is gone
    HostLeft,

    /// Protocol error (malformed frames only; never authorization)
    Error(ErrorPayload),
}

// =============================================================================
// Payload Types
// =============================================================================

/// Error codes surfaced on request/response replies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionErrorCode {
    /// Unknown session code on join
    NotFound,
    /// Listener cap reached
    Capacity,
    /// Code generation retries exhausted on create
    Collision,
}

/// Reply payload for CreateSession
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionReply {
    pub ok: bool,
    pub code: Option<String>,
    pub name: Option<String>,
    /// Capability token proving host privilege; carried on every
    /// privileged message
    pub host_token: Option<String>,
    pub error: Option<SessionErrorCode>,
}

impl CreateSessionReply {
    pub fn ok(code: String, name: String, host_token: String) -> Self {
        Self {
            ok: true,
            code: Some(code),
            name: Some(name),
            host_token: Some(host_token),
            error: None,
        }
    }

    pub fn err(error: SessionErrorCode) -> Self {
        Self {
            ok: false,
            code: None,
            name: None,
            host_token: None,
            error: Some(error),
        }
    }
}

/// Reply payload for JoinSession
///
/// On success this carries the full current snapshot so a late joiner can
/// compute its playback position from `server_play_at` without waiting for
/// the next host action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSessionReply {
    pub ok: bool,
    pub name: Option<String>,
    pub track: Option<TrackInfo>,
    pub state: Option<PlaybackState>,
    pub error: Option<SessionErrorCode>,
}

impl JoinSessionReply {
    pub fn ok(name: String, track: Option<TrackInfo>, state: PlaybackState) -> Self {
        Self {
            ok: true,
            name: Some(name),
            track,
            state: Some(state),
            error: None,
        }
    }

    pub fn err(error: SessionErrorCode) -> Self {
        Self {
            ok: false,
            name: None,
            track: None,
            state: None,
            error: Some(error),
        }
    }
}

/// The session's current track reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackInfo {
    /// Opaque media reference; resolution to a playable stream is the
    /// client's (or an external resolver's) concern
    pub source_ref: String,
    pub title: String,
}

/// Playback state shared with every session member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackState {
    /// Whether playback is active
    pub playing: bool,

    /// Current position in seconds
    pub position_secs: f64,

    /// Server-wall-clock instant (Unix ms) at which playback begins;
    /// present exactly when `playing` is true
    pub server_play_at: Option<i64>,

    /// Unix timestamp (ms) when this state last changed
    pub updated_at: i64,
}

impl PlaybackState {
    /// Initial state: stopped at position zero
    pub fn new() -> Self {
        Self {
            playing: false,
            position_secs: 0.0,
            server_play_at: None,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for Error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::new("INVALID_MESSAGE", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::Play {
            position_secs: 12.5,
            server_play_at: 1234567890,
            host_token: "tok-1".into(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("Play"));
        assert!(json.contains("1234567890"));

        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ClientMessage::Play { .. }));
    }

    #[test]
    fn test_seek_without_deadline_deserializes() {
        let json = r#"{"type":"Seek","payload":{"position_secs":30.0,"resume_playing":false,"server_play_at":null,"host_token":"tok-1"}}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            parsed,
            ClientMessage::Seek {
                resume_playing: false,
                server_play_at: None,
                ..
            }
        ));
    }

    #[test]
    fn test_server_message_serialization() {
        let msg = ServerMessage::Connected {
            connection_id: Uuid::nil(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("Connected"));

        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ServerMessage::Connected { .. }));
    }

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionErrorCode::NotFound).unwrap(),
            "\"NotFound\""
        );
        assert_eq!(
            serde_json::to_string(&SessionErrorCode::Capacity).unwrap(),
            "\"Capacity\""
        );
        assert_eq!(
            serde_json::to_string(&SessionErrorCode::Collision).unwrap(),
            "\"Collision\""
        );
    }

    #[test]
    fn test_create_reply_constructors() {
        let ok = CreateSessionReply::ok("K7QXM2".into(), "Study Hall".into(), "tok".into());
        assert!(ok.ok);
        assert_eq!(ok.code.as_deref(), Some("K7QXM2"));
        assert!(ok.error.is_none());

        let err = CreateSessionReply::err(SessionErrorCode::Collision);
        assert!(!err.ok);
        assert!(err.code.is_none());
        assert_eq!(err.error, Some(SessionErrorCode::Collision));
    }

    #[test]
    fn test_join_reply_carries_snapshot() {
        let state = PlaybackState {
            playing: true,
            position_secs: 42.0,
            server_play_at: Some(99),
            updated_at: 0,
        };
        let reply = JoinSessionReply::ok("Study Hall".into(), None, state.clone());

        let json = serde_json::to_string(&ServerMessage::JoinSessionReply(reply)).unwrap();
        assert!(json.contains("JoinSessionReply"));
        assert!(json.contains("server_play_at"));

        let parsed: ServerMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ServerMessage::JoinSessionReply(r) => {
                assert!(r.ok);
                assert_eq!(r.state, Some(state));
                assert!(r.track.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_playback_state_default_is_stopped() {
        let state = PlaybackState::new();
        assert!(!state.playing);
        assert_eq!(state.position_secs, 0.0);
        assert!(state.server_play_at.is_none());
    }
}
