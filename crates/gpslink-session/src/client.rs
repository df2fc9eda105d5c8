use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gpslink_frame::{FrameWriter, GpsRecord};
use gpslink_transport::{Link, Resolver, SystemResolver, TransportError, TransportMode};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};

/// Connection state of a [`ClientSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Never connected, or disconnected on request.
    Disconnected,
    Connected,
    /// The last connect or send failed; reconnects wait out the cooldown.
    Failed,
}

/// Result of [`ClientSession::try_reconnect`].
#[derive(Debug)]
pub enum ReconnectOutcome {
    Connected,
    AlreadyConnected,
    /// The cooldown since the last failure has not elapsed; nothing was
    /// attempted.
    CoolingDown { remaining: Duration },
    /// One pass was made and failed; the cooldown restarts.
    Failed(SessionError),
}

/// Sending side of the protocol.
///
/// Single-threaded: every call blocks, including the pause between connect
/// attempts.
pub struct ClientSession {
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn Resolver>,
    state: ClientState,
    writer: Option<FrameWriter<Link>>,
    peer: Option<SocketAddr>,
    last_failure_at: Option<Instant>,
    attempts_remaining: u32,
    frames_sent: u64,
}

impl ClientSession {
    /// Session using the system clock and resolver.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(SystemResolver))
    }

    /// Session with an injected clock and resolver.
    pub fn with_parts(
        config: ClientConfig,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        let attempts_remaining = config.max_connect_attempts.max(1);
        Self {
            config,
            clock,
            resolver,
            state: ClientState::Disconnected,
            writer: None,
            peer: None,
            last_failure_at: None,
            attempts_remaining,
            frames_sent: 0,
        }
    }

    /// Connect with bounded retry.
    ///
    /// Each failed resolution or connection uses up one attempt, with
    /// `connect_retry_delay` slept between attempts. After the last one the
    /// session is `Failed` and the final error is returned inside
    /// [`SessionError::ConnectExhausted`].
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let attempts = self.config.max_connect_attempts.max(1);
        self.attempts_remaining = attempts;
        let mut last = None;

        while self.attempts_remaining > 0 {
            self.attempts_remaining -= 1;
            let attempt = attempts - self.attempts_remaining;
            match self.connect_once() {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        target_addr = %self.config.target(),
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "connect attempt failed"
                    );
                    last = Some(err);
                    if self.attempts_remaining > 0 {
                        self.clock.sleep(self.config.connect_retry_delay);
                    }
                }
            }
        }

        self.mark_failed();
        let last = last.unwrap_or(SessionError::NotConnected);
        Err(SessionError::ConnectExhausted {
            target: self.config.target(),
            attempts,
            last: Box::new(last),
        })
    }

    /// One resolve-and-connect pass, gated by the reconnect cooldown.
    ///
    /// Does not consume connect attempts.
    pub fn try_reconnect(&mut self) -> ReconnectOutcome {
        if self.is_connected() {
            return ReconnectOutcome::AlreadyConnected;
        }

        if let Some(remaining) = self.cooldown_remaining() {
            return ReconnectOutcome::CoolingDown { remaining };
        }

        match self.connect_once() {
            Ok(()) => ReconnectOutcome::Connected,
            Err(err) => {
                warn!(target_addr = %self.config.target(), error = %err, "reconnect failed");
                self.mark_failed();
                ReconnectOutcome::Failed(err)
            }
        }
    }

    /// Time left before [`try_reconnect`](Self::try_reconnect) will act.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let failed_at = self.last_failure_at?;
        let elapsed = self.clock.now().saturating_duration_since(failed_at);
        self.config
            .reconnect_cooldown
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    /// Encode and send one GPS record.
    ///
    /// A record that cannot be encoded is refused without touching the link.
    /// A write failure drops the link and marks the session `Failed`.
    pub fn send(&mut self, record: &GpsRecord) -> Result<()> {
        record.validate()?;
        let result = match self.writer.as_mut() {
            Some(writer) => writer.send_record(record),
            None => return Err(SessionError::NotConnected),
        };
        self.after_send(result)
    }

    /// Send a no-fix frame.
    pub fn send_no_fix(&mut self) -> Result<()> {
        let result = match self.writer.as_mut() {
            Some(writer) => writer.send_no_fix(),
            None => return Err(SessionError::NotConnected),
        };
        self.after_send(result)
    }

    /// Drop the link without recording a failure.
    pub fn disconnect(&mut self) {
        if self.writer.take().is_some() {
            info!(target_addr = %self.config.target(), "disconnected");
        }
        self.state = ClientState::Disconnected;
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// When the most recent connect or send failure happened.
    pub fn last_failure_at(&self) -> Option<Instant> {
        self.last_failure_at
    }

    /// Attempts left in the current or most recent [`connect`](Self::connect).
    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    /// Address of the server the session last connected to.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn after_send(&mut self, result: gpslink_frame::Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.frames_sent += 1;
                Ok(())
            }
            Err(source) => {
                warn!(target_addr = %self.config.target(), error = %source, "send failed, dropping link");
                self.mark_failed();
                Err(SessionError::Send { source })
            }
        }
    }

    fn mark_failed(&mut self) {
        self.writer = None;
        self.state = ClientState::Failed;
        self.last_failure_at = Some(self.clock.now());
    }

    fn connect_once(&mut self) -> Result<()> {
        let addrs = self.resolver.resolve(&self.config.server, self.config.port)?;

        let mut last_err = None;
        let mut connected = None;
        for addr in addrs {
            let attempt = match self.config.mode {
                TransportMode::Stream => Link::connect_stream(addr),
                TransportMode::Datagram => Link::connect_datagram(addr),
            };
            match attempt {
                Ok(link) => {
                    connected = Some((link, addr));
                    break;
                }
                Err(err) => {
                    debug!(%addr, error = %err, "address unreachable");
                    last_err = Some(err);
                }
            }
        }

        let (link, addr) = match (connected, last_err) {
            (Some(found), _) => found,
            (None, Some(err)) => return Err(err.into()),
            (None, None) => {
                return Err(TransportError::NoAddress {
                    host: self.config.server.clone(),
                    port: self.config.port,
                }
                .into())
            }
        };

        let mut writer = FrameWriter::with_config_link(link, self.config.frame.clone())?;
        if self.config.mode == TransportMode::Datagram {
            if let Some(greeting) = self.config.datagram_greeting.as_ref() {
                writer.send_raw(greeting)?;
            }
        }

        info!(%addr, mode = self.config.mode.as_str(), "connected");
        self.writer = Some(writer);
        self.peer = Some(addr);
        self.state = ClientState::Connected;
        Ok(())
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("target", &self.config.target())
            .field("mode", &self.config.mode)
            .field("state", &self.state)
            .field("peer", &self.peer)
            .field("last_failure_at", &self.last_failure_at)
            .finish()
    }
}
