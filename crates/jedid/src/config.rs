//! Server configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use jedi_protocol::MAX_FRAME_LEN;
use tracing::warn;

/// Default TCP port for the chat relay.
pub const DEFAULT_PORT: u16 = 31337;

/// Configuration for the chat server.
///
/// # Example
///
/// ```rust
/// use jedid::config::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_port(4000)
///     .with_shutdown_grace(Duration::from_secs(1));
/// assert_eq!(config.port, 4000);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener on.
    pub bind_addr: IpAddr,

    /// Port used when `start` is invoked without an explicit port.
    pub port: u16,

    /// Upper bound on a single frame write to one client.
    pub write_timeout: Duration,

    /// How long a new connection may take to send its registration frame.
    pub registration_timeout: Duration,

    /// How long `stop` waits for reader tasks to finish.
    pub shutdown_grace: Duration,

    /// Largest accepted frame, in bytes.
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            write_timeout: Duration::from_secs(10),
            registration_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl ServerConfig {
    pub fn with_bind_addr(mut self, bind_addr: IpAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Loopback config for tests and local runs.
    pub fn loopback() -> Self {
        Self::default().with_bind_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

/// Resolves the optional port argument.
///
/// Missing or unparsable values fall back to [`DEFAULT_PORT`].
pub fn resolve_port(arg: Option<&str>) -> u16 {
    match arg {
        None => DEFAULT_PORT,
        Some(raw) => match raw.trim().parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                warn!(value = %raw, default = DEFAULT_PORT, "Invalid port number, using default");
                DEFAULT_PORT
            }
        },
    }
}
