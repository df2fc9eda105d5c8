use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// How a client reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Connection-oriented (TCP).
    #[default]
    Stream,
    /// Connectionless (UDP); the "connection" is the cached peer address.
    Datagram,
}

impl TransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportMode::Stream => "stream",
            TransportMode::Datagram => "datagram",
        }
    }
}

/// A connected link to one peer, readable and writable.
///
/// For datagram links each `write` is one `send` to the cached peer and
/// each `read` is one `recv` from it.
pub struct Link {
    inner: LinkInner,
}

enum LinkInner {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Read for Link {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => stream.read(buf),
            LinkInner::Udp(socket) => socket.recv(buf),
        }
    }
}

impl Write for Link {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => stream.write(buf),
            LinkInner::Udp(socket) => socket.send(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkInner::Tcp(stream) => stream.flush(),
            LinkInner::Udp(_) => Ok(()),
        }
    }
}

impl Link {
    /// Wrap an already connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: LinkInner::Tcp(stream),
        }
    }

    /// Wrap a UDP socket that has been `connect`ed to its peer.
    pub fn from_udp(socket: UdpSocket) -> Self {
        Self {
            inner: LinkInner::Udp(socket),
        }
    }

    /// Open a TCP connection to `addr` (blocking).
    pub fn connect_stream(addr: SocketAddr) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
        // Frames are small and latency matters more than packet count.
        stream
            .set_nodelay(true)
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected stream link");
        Ok(Self::from_tcp(stream))
    }

    /// Open a UDP socket with `addr` cached as its default peer.
    pub fn connect_datagram(addr: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).map_err(|source| TransportError::Bind {
            addr: local,
            source,
        })?;
        socket
            .connect(addr)
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connected datagram link");
        Ok(Self::from_udp(socket))
    }

    /// Transport mode of this link.
    pub fn mode(&self) -> TransportMode {
        match &self.inner {
            LinkInner::Tcp(_) => TransportMode::Stream,
            LinkInner::Udp(_) => TransportMode::Datagram,
        }
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            LinkInner::Tcp(stream) => stream.peer_addr().map_err(Into::into),
            LinkInner::Udp(socket) => socket.peer_addr().map_err(Into::into),
        }
    }

    /// Local address of this end of the link.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.inner {
            LinkInner::Tcp(stream) => stream.local_addr().map_err(Into::into),
            LinkInner::Udp(socket) => socket.local_addr().map_err(Into::into),
        }
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            LinkInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            LinkInner::Udp(socket) => socket.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            LinkInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            LinkInner::Udp(socket) => socket.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this link (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            LinkInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            LinkInner::Udp(socket) => Ok(Self::from_udp(socket.try_clone()?)),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("Link");
        dbg.field("mode", &self.mode().as_str());
        if let Ok(peer) = self.peer_addr() {
            dbg.field("peer", &peer);
        }
        dbg.finish()
    }
}
