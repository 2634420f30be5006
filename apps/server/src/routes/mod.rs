//! HTTP route handlers
//!
//! The only HTTP surface besides the WebSocket upgrade is the health
//! endpoint family.

pub mod health;

pub use health::{health_router, HealthState};
