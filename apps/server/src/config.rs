//! Server configuration

use std::env;

use anyhow::{Context, Result};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8080)
    pub port: u16,

    /// Idle-session time-to-live in seconds (default: 3600)
    pub session_ttl_secs: u64,

    /// Idle-session sweep interval in seconds (default: 60)
    pub sweep_interval_secs: u64,

    /// Maximum listeners per session, host excluded (default: 64)
    pub max_listeners: usize,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT value")?,

            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("Invalid SESSION_TTL_SECS value")?,

            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid SWEEP_INTERVAL_SECS value")?,

            max_listeners: env::var("MAX_LISTENERS")
                .unwrap_or_else(|_| "64".to_string())
                .parse()
                .context("Invalid MAX_LISTENERS value")?,

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }
}
