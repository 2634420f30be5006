//! Unison server library
//!
//! Exposes the core components for use in integration tests and as a
//! library.

pub mod config;
pub mod routes;
pub mod websocket;

pub use config::Config;
pub use websocket::{ConnectionManager, SessionRegistry};
