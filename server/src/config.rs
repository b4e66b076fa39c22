use std::time::Duration;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the UDP socket to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Largest datagram the server will emit
    pub max_datagram_size: usize,
    /// Cap on entries per roster broadcast
    pub max_roster_entries: usize,
    /// Admissions allowed per endpoint per rate window
    pub rate_capacity: u32,
    /// Length of the rate window; also the rotation interval
    pub rate_window: Duration,
    /// Silence after which a member is removed from their room
    pub member_timeout: Duration,
    /// Silence after which a ghost entry is purged
    pub ghost_timeout: Duration,
    /// How often stale members and ghosts are culled
    pub cull_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 27015,
            max_datagram_size: shared::MAX_DATAGRAM_SIZE,
            max_roster_entries: shared::MAX_ROSTER_ENTRIES,
            rate_capacity: 100,
            rate_window: Duration::from_secs(60),
            member_timeout: Duration::from_secs(5),
            ghost_timeout: Duration::from_secs(30),
            cull_interval: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
