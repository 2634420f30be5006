//! WebSocket session protocol
//!
//! This module implements the synchronized listening protocol:
//! - Session registry with short codes and idle reclamation
//! - Host-authoritative playback state machine
//! - Clock-sync ping/pong responder
//! - Connection lifecycle and session-scoped broadcast

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;
pub mod sync;

pub use connection::{ConnectionId, ConnectionManager};
pub use handler::ws_handler;
pub use registry::SessionRegistry;
