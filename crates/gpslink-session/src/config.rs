use std::time::Duration;

use bytes::Bytes;
use gpslink_frame::FrameConfig;
use gpslink_transport::{TransportMode, DEFAULT_BACKLOG};

/// Well-known server port.
pub const DEFAULT_PORT: u16 = 3412;

/// Connect attempts made by [`ClientSession::connect`](crate::ClientSession::connect).
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Pause between two connect attempts.
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Minimum time between a failure and the next reconnect pass.
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(10);

/// Greeting sent once per datagram link, ahead of the first frame.
///
/// `ServerSession` only accepts TCP; datagram senders need an external UDP
/// collector.
pub const DEFAULT_DATAGRAM_GREETING: &[u8] = b"GPSLINK\n";

/// Client session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub server: String,
    pub port: u16,
    pub mode: TransportMode,
    /// Upper bound on attempts per [`connect`](crate::ClientSession::connect)
    /// call. Values below 1 are treated as 1.
    pub max_connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub reconnect_cooldown: Duration,
    /// Bytes sent right after a datagram link is set up. `None` disables.
    pub datagram_greeting: Option<Bytes>,
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "localhost".to_string(),
            port: DEFAULT_PORT,
            mode: TransportMode::Stream,
            max_connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
            reconnect_cooldown: DEFAULT_RECONNECT_COOLDOWN,
            datagram_greeting: Some(Bytes::from_static(DEFAULT_DATAGRAM_GREETING)),
            frame: FrameConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Default configuration aimed at `server:port`.
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_connect_attempts(mut self, attempts: u32) -> Self {
        self.max_connect_attempts = attempts;
        self
    }

    pub fn with_connect_retry_delay(mut self, delay: Duration) -> Self {
        self.connect_retry_delay = delay;
        self
    }

    pub fn with_reconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.reconnect_cooldown = cooldown;
        self
    }

    pub fn with_datagram_greeting(mut self, greeting: Option<Bytes>) -> Self {
        self.datagram_greeting = greeting;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    /// `server:port` for logs and errors.
    pub fn target(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

/// Server session configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind; the wildcard address listens on every interface.
    pub bind_host: String,
    /// `0` picks an ephemeral port.
    pub port: u16,
    pub backlog: i32,
    /// How long [`run`](crate::ServerSession::run) waits for a connection
    /// before re-checking its stop flag.
    pub accept_poll_interval: Duration,
    /// Applied to every accepted connection.
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            accept_poll_interval: Duration::from_millis(100),
            frame: FrameConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(bind_host: impl Into<String>, port: u16) -> Self {
        Self {
            bind_host: bind_host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.port, 3412);
        assert_eq!(cfg.max_connect_attempts, 3);
        assert_eq!(cfg.connect_retry_delay, Duration::from_secs(2));
        assert_eq!(cfg.reconnect_cooldown, Duration::from_secs(10));
        assert_eq!(cfg.mode, TransportMode::Stream);
        assert_eq!(cfg.datagram_greeting.as_deref(), Some(&b"GPSLINK\n"[..]));
        assert!(cfg.frame.read_timeout.is_none());
    }

    #[test]
    fn client_builders() {
        let cfg = ClientConfig::new("gps.example", 4000)
            .with_mode(TransportMode::Datagram)
            .with_max_connect_attempts(5)
            .with_datagram_greeting(None);
        assert_eq!(cfg.target(), "gps.example:4000");
        assert_eq!(cfg.mode, TransportMode::Datagram);
        assert_eq!(cfg.max_connect_attempts, 5);
        assert!(cfg.datagram_greeting.is_none());
    }

    #[test]
    fn server_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_host, "0.0.0.0");
        assert_eq!(cfg.port, 3412);
        assert_eq!(cfg.backlog, 5);
        assert!(cfg.frame.liveness_ack.is_none());
    }
}
