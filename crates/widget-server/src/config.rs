//! Server Configuration

use std::time::Duration;

/// Settings owned by the HTTP layer
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Bound on every storage call made directly by a handler
    pub timeout: Duration,

    /// Sender address for outgoing mail
    pub mail_from: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4001".into(),
            timeout: Duration::from_secs(5),
            mail_from: "info@widgets.com".into(),
        }
    }
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(secs) = std::env::var("EXTERNAL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(from) = std::env::var("MAIL_FROM") {
            config.mail_from = from;
        }
        config
    }
}
