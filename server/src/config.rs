use std::net::SocketAddr;
use std::time::Duration;

use shared::{DEFAULT_PORT, TICK_INTERVAL_MS};

/// Runtime settings for a [`crate::network::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub tick_interval: Duration,
    pub max_clients: usize,
    /// Idle limit before the login request arrives.
    pub pre_auth_timeout: Duration,
    /// Idle limit once logged in. Clients ping every 30 seconds.
    pub post_auth_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            max_clients: 256,
            pre_auth_timeout: Duration::from_secs(5),
            post_auth_timeout: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn with_addr(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }
}
