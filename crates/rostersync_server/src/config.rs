//! Server configuration.

use std::net::SocketAddr;

/// Configuration for the record server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address an HTTP front end would bind to.
    pub bind_addr: SocketAddr,
    /// Events queued per realtime session before it is marked lagged.
    pub broadcast_capacity: usize,
    /// Whether to load the default roster into an empty store on start.
    pub seed_on_start: bool,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            broadcast_capacity: 256,
            seed_on_start: true,
        }
    }

    /// Sets the per-session realtime queue capacity (at least 1).
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Sets whether an empty store is seeded on start.
    pub fn with_seed_on_start(mut self, seed: bool) -> Self {
        self.seed_on_start = seed;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 4000)))
    }
}
