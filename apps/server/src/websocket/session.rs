//! Session entity and playback state machine
//!
//! A session is one room's authoritative state: its host, its listeners,
//! the current track, and the current playback state. All mutation goes
//! through the transition methods here, which keep the state invariants
//! (`server_play_at` is present exactly while playing) and the activity
//! timestamp used by idle reclamation.

use std::collections::HashSet;
use uuid::Uuid;

use super::connection::ConnectionId;
use super::messages::{PlaybackState, TrackInfo};

/// Maximum length of a user-chosen session display name
pub const MAX_NAME_LEN: usize = 64;

/// One live listening session
#[derive(Debug)]
pub struct Session {
    /// Short opaque identifier, unique among live sessions
    pub code: String,

    /// Identity of the single authoritative connection
    pub host_conn: ConnectionId,

    /// Session-scoped capability token issued at creation; proof of host
    /// privilege, decoupled from transport identity
    pub host_token: String,

    /// User-chosen label, clamped to MAX_NAME_LEN
    pub display_name: String,

    /// Connection identities of listeners; never contains the host
    pub listeners: HashSet<ConnectionId>,

    /// Current track; absent until the host sets one
    pub track: Option<TrackInfo>,

    /// Current playback state
    pub state: PlaybackState,

    pub created_at: i64,

    /// Mutation timestamp used by idle-session reclamation
    pub last_active_at: i64,
}

impl Session {
    /// Create a new session hosted by `host_conn`
    pub fn new(code: String, host_conn: ConnectionId, display_name: &str) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let display_name: String = display_name.chars().take(MAX_NAME_LEN).collect();

        Self {
            code,
            host_conn,
            host_token: Uuid::new_v4().to_string(),
            display_name,
            listeners: HashSet::new(),
            track: None,
            state: PlaybackState::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Mark the session as recently active
    pub fn touch(&mut self) {
        self.last_active_at = chrono::Utc::now().timestamp_millis();
    }

    /// Whether `token` proves host privilege for this session
    pub fn is_host_token(&self, token: &str) -> bool {
        self.host_token == token
    }

    /// Set a new track, resetting playback to stopped at position zero
    pub fn set_track(&mut self, track: TrackInfo) {
        self.track = Some(track);
        self.state = PlaybackState::new();
        self.touch();
    }

    /// Start playback at `server_play_at`
    pub fn play(&mut self, position_secs: f64, server_play_at: i64) {
        self.state = PlaybackState {
            playing: true,
            position_secs,
            server_play_at: Some(server_play_at),
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        self.touch();
    }

    /// Pause playback, clearing the scheduled start instant
    pub fn pause(&mut self, position_secs: f64) {
        self.state = PlaybackState {
            playing: false,
            position_secs,
            server_play_at: None,
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        self.touch();
    }

    /// Jump to a position, playing again only when `resume_playing`
    ///
    /// A resume without a supplied deadline starts immediately, keeping the
    /// invariant that a deadline exists exactly while playing.
    pub fn seek(&mut self, position_secs: f64, resume_playing: bool, server_play_at: Option<i64>) {
        let now = chrono::Utc::now().timestamp_millis();
        self.state = PlaybackState {
            playing: resume_playing,
            position_secs,
            server_play_at: if resume_playing {
                Some(server_play_at.unwrap_or(now))
            } else {
                None
            },
            updated_at: now,
        };
        self.touch();
    }

    /// Add a listener; the host never appears in the listener set
    pub fn add_listener(&mut self, conn: ConnectionId) {
        if conn != self.host_conn {
            self.listeners.insert(conn);
        }
        self.touch();
    }

    /// Remove a listener, returning whether it was a member
    pub fn remove_listener(&mut self, conn: ConnectionId) -> bool {
        let removed = self.listeners.remove(&conn);
        if removed {
            self.touch();
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Total member count including the host
    pub fn member_count(&self) -> usize {
        self.listeners.len() + 1
    }

    /// Every member's connection id, host included
    pub fn members(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        std::iter::once(self.host_conn).chain(self.listeners.iter().copied())
    }

    /// Whether `last_active_at` predates `now - ttl_ms`
    pub fn is_idle(&self, now: i64, ttl_ms: i64) -> bool {
        self.last_active_at < now - ttl_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> TrackInfo {
        TrackInfo {
            source_ref: "abc".into(),
            title: "Track 1".into(),
        }
    }

    #[test]
    fn test_new_session_is_idle_state() {
        let session = Session::new("K7QXM2".into(), Uuid::new_v4(), "Study Hall");
        assert!(session.track.is_none());
        assert!(!session.state.playing);
        assert_eq!(session.state.position_secs, 0.0);
        assert!(session.state.server_play_at.is_none());
        assert_eq!(session.listener_count(), 0);
    }

    #[test]
    fn test_display_name_clamped() {
        let long = "x".repeat(MAX_NAME_LEN + 20);
        let session = Session::new("AAAAAA".into(), Uuid::new_v4(), &long);
        assert_eq!(session.display_name.chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn test_play_sets_deadline_pause_clears_it() {
        let mut session = Session::new("AAAAAA".into(), Uuid::new_v4(), "room");
        session.set_track(track());

        session.play(10.0, 5000);
        assert!(session.state.playing);
        assert_eq!(session.state.position_secs, 10.0);
        assert_eq!(session.state.server_play_at, Some(5000));

        session.pause(12.0);
        assert!(!session.state.playing);
        assert_eq!(session.state.position_secs, 12.0);
        assert!(session.state.server_play_at.is_none());
    }

    #[test]
    fn test_seek_resume_keeps_deadline() {
        let mut session = Session::new("AAAAAA".into(), Uuid::new_v4(), "room");

        session.seek(30.0, true, Some(7000));
        assert!(session.state.playing);
        assert_eq!(session.state.server_play_at, Some(7000));

        // Resume without a deadline starts now
        session.seek(31.0, true, None);
        assert!(session.state.playing);
        assert!(session.state.server_play_at.is_some());

        // Seeking while paused discards any supplied deadline
        session.seek(45.0, false, Some(9000));
        assert!(!session.state.playing);
        assert!(session.state.server_play_at.is_none());
        assert_eq!(session.state.position_secs, 45.0);
    }

    #[test]
    fn test_set_track_resets_playback() {
        let mut session = Session::new("AAAAAA".into(), Uuid::new_v4(), "room");
        session.play(120.0, 5000);

        session.set_track(track());
        assert!(!session.state.playing);
        assert_eq!(session.state.position_secs, 0.0);
        assert!(session.state.server_play_at.is_none());
        assert_eq!(session.track, Some(track()));
    }

    #[test]
    fn test_host_never_in_listeners() {
        let host = Uuid::new_v4();
        let mut session = Session::new("AAAAAA".into(), host, "room");

        session.add_listener(host);
        assert_eq!(session.listener_count(), 0);

        let listener = Uuid::new_v4();
        session.add_listener(listener);
        assert_eq!(session.listener_count(), 1);
        assert_eq!(session.member_count(), 2);

        let members: Vec<_> = session.members().collect();
        assert!(members.contains(&host));
        assert!(members.contains(&listener));
    }

    #[test]
    fn test_mutation_touches_activity() {
        let mut session = Session::new("AAAAAA".into(), Uuid::new_v4(), "room");
        session.last_active_at = 0;

        session.play(0.0, 1000);
        assert!(session.last_active_at > 0);

        session.last_active_at = 0;
        session.set_track(track());
        assert!(session.last_active_at > 0);
    }

    #[test]
    fn test_idle_check() {
        let mut session = Session::new("AAAAAA".into(), Uuid::new_v4(), "room");
        let now = chrono::Utc::now().timestamp_millis();

        assert!(!session.is_idle(now, 60_000));

        session.last_active_at = now - 120_000;
        assert!(session.is_idle(now, 60_000));
    }

    #[test]
    fn test_host_token_check() {
        let session = Session::new("AAAAAA".into(), Uuid::new_v4(), "room");
        let token = session.host_token.clone();

        assert!(session.is_host_token(&token));
        assert!(!session.is_host_token("not-the-token"));
    }
}
