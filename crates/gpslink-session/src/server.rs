use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gpslink_transport::{resolve, LinkListener, TransportError};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, SessionError};
use crate::registry::{ConnectionInfo, ConnectionRegistry, ConnectionSummary};
use crate::sink::RecordSink;
use crate::worker::serve_connection;

/// Listening state of a [`ServerSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Offline,
    Listening,
}

/// Receiving side of the protocol.
///
/// Accepts connections and hands each one to a dedicated worker thread that
/// owns the socket and its parser. Workers share nothing but the sink.
pub struct ServerSession {
    config: ServerConfig,
    sink: Arc<dyn RecordSink>,
    listener: Option<LinkListener>,
    registry: ConnectionRegistry,
}

impl ServerSession {
    pub fn new(config: ServerConfig, sink: impl RecordSink + 'static) -> Self {
        Self::with_shared_sink(config, Arc::new(sink))
    }

    pub fn with_shared_sink(config: ServerConfig, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            config,
            sink,
            listener: None,
            registry: ConnectionRegistry::new(),
        }
    }

    /// Resolve the bind address, then bind and listen.
    ///
    /// Calling `start` while already listening is a no-op.
    pub fn start(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = self.listener.as_ref() {
            return Ok(listener.local_addr());
        }

        let addr = resolve(&self.config.bind_host, self.config.port)?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::NoAddress {
                host: self.config.bind_host.clone(),
                port: self.config.port,
            })?;
        let listener = LinkListener::bind_with_backlog(addr, self.config.backlog)?;
        let local_addr = listener.local_addr();
        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Wait up to `timeout` for one connection and hand it to a worker.
    ///
    /// `Duration::ZERO` makes a single non-blocking attempt. Returns `None`
    /// when nothing was pending.
    pub fn poll_accept(&mut self, timeout: Duration) -> Result<Option<ConnectionInfo>> {
        let listener = self.listener.as_ref().ok_or(SessionError::NotListening)?;
        let Some((link, peer_addr)) = listener.accept_timeout(timeout)? else {
            return Ok(None);
        };

        let info = self.registry.register(peer_addr)?;
        let worker_info = info.clone();
        let frame = self.config.frame.clone();
        let sink = Arc::clone(&self.sink);
        let handle = std::thread::Builder::new()
            .name(format!("gpslink-conn-{}", info.id))
            .spawn(move || serve_connection(&worker_info, link, frame, sink))
            .map_err(SessionError::Spawn)?;

        info!(connection_id = info.id, peer = %peer_addr, "connection accepted");
        self.registry.track(info.clone(), handle);
        Ok(Some(info))
    }

    /// Accept connections until `running` is cleared.
    ///
    /// The flag is checked every `accept_poll_interval`. Finished workers
    /// are reaped on each pass. Failed accepts are logged and skipped.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        let interval = self.config.accept_poll_interval;
        while running.load(Ordering::SeqCst) {
            match self.poll_accept(interval) {
                Ok(_) => {}
                Err(SessionError::Transport(TransportError::Accept(err))) => {
                    warn!(error = %err, "accept failed");
                }
                Err(err) => return Err(err),
            }
            self.reap();
        }
        Ok(())
    }

    /// Join finished workers and log how they ended.
    pub fn reap(&mut self) -> Vec<(ConnectionInfo, ConnectionSummary)> {
        let finished = self.registry.reap();
        for (info, summary) in &finished {
            info!(
                connection_id = info.id,
                peer = %info.peer_addr,
                records = summary.records,
                checksum_failures = summary.checksum_failures,
                end = ?summary.end,
                "connection finished"
            );
        }
        finished
    }

    /// Close the listening socket. Running workers are left alone.
    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            info!(local_addr = %listener.local_addr(), "listener closed");
        }
    }

    pub fn state(&self) -> ServerState {
        if self.listener.is_some() {
            ServerState::Listening
        } else {
            ServerState::Offline
        }
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(LinkListener::local_addr)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("registry", &self.registry)
            .finish()
    }
}
