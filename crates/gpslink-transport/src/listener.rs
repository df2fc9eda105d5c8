use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Link;

/// Pending-connection queue length passed to `listen(2)`.
pub const DEFAULT_BACKLOG: i32 = 5;

/// Listening TCP socket with address reuse, an explicit backlog, and
/// non-blocking accept.
///
/// `accept_timeout` waits for readiness with `poll(2)` instead of spinning
/// on `EWOULDBLOCK`.
pub struct LinkListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl LinkListener {
    /// Bind with [`DEFAULT_BACKLOG`].
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        Self::bind_with_backlog(addr, DEFAULT_BACKLOG)
    }

    /// Enable `SO_REUSEADDR`, bind, listen with `backlog`, and switch the
    /// socket to non-blocking mode.
    pub fn bind_with_backlog(addr: SocketAddr, backlog: i32) -> Result<Self> {
        let listener =
            bind_reuse(addr, backlog).map_err(|source| TransportError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%local_addr, backlog, "listening");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Single non-blocking accept attempt.
    ///
    /// Returns `Ok(None)` when no connection is pending. Accepted links are
    /// switched back to blocking mode.
    pub fn try_accept(&self) -> Result<Option<(Link, SocketAddr)>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false).map_err(TransportError::Accept)?;
                stream.set_nodelay(true).map_err(TransportError::Accept)?;
                debug!(%peer, "accepted connection");
                Ok(Some((Link::from_tcp(stream), peer)))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// Wait up to `timeout` for a pending connection, then accept it.
    ///
    /// `Duration::ZERO` degrades to [`try_accept`](Self::try_accept).
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<(Link, SocketAddr)>> {
        if !timeout.is_zero() && !self.wait_readable(timeout)? {
            return Ok(None);
        }
        self.try_accept()
    }

    /// Block up to `timeout` until the listener reports a pending connection.
    #[cfg(unix)]
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        use std::os::fd::AsRawFd;

        let mut pfd = libc::pollfd {
            fd: self.listener.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        loop {
            // SAFETY: `pfd` is a valid, writable pollfd and the count is 1; the
            // descriptor stays open for the lifetime of `self`.
            let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(TransportError::Io(err));
            }
            return Ok(rc > 0);
        }
    }

    /// Block up to `timeout` until the listener reports a pending connection.
    ///
    /// Without `poll(2)` this sleeps a short slice and lets `try_accept`
    /// decide.
    #[cfg(not(unix))]
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        std::thread::sleep(timeout.min(Duration::from_millis(10)));
        Ok(true)
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Hand the configured, non-blocking socket to another runtime.
    pub fn into_std(self) -> TcpListener {
        self.listener
    }
}

impl std::fmt::Debug for LinkListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkListener")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

#[cfg(unix)]
fn bind_reuse(addr: SocketAddr, backlog: i32) -> std::io::Result<TcpListener> {
    use std::os::fd::{FromRawFd, OwnedFd};

    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };
    #[cfg(target_os = "linux")]
    let ty = libc::SOCK_STREAM | libc::SOCK_CLOEXEC;
    #[cfg(not(target_os = "linux"))]
    let ty = libc::SOCK_STREAM;

    // SAFETY: socket(2) takes no pointers; the result is checked below.
    let fd = unsafe { libc::socket(domain, ty, 0) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `fd` is a freshly created descriptor owned by nothing else.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };

    let one: libc::c_int = 1;
    // SAFETY: `one` outlives the call and the length matches its type.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            (&one as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let (storage, len) = raw_sockaddr(&addr);
    // SAFETY: `storage` holds a sockaddr_in/sockaddr_in6 of exactly `len` bytes.
    let rc = unsafe {
        libc::bind(
            fd,
            (&storage as *const libc::sockaddr_storage).cast::<libc::sockaddr>(),
            len,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: listen(2) takes no pointers.
    let rc = unsafe { libc::listen(fd, backlog) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(TcpListener::from(owned))
}

#[cfg(unix)]
fn raw_sockaddr(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    // SAFETY: sockaddr_storage is plain data; all-zero is a valid value.
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in.
            let sin = unsafe {
                &mut *(&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr_in>()
            };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
            std::mem::size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in6.
            let sin6 = unsafe {
                &mut *(&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr_in6>()
            };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            sin6.sin6_scope_id = v6.scope_id();
            std::mem::size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

#[cfg(not(unix))]
fn bind_reuse(addr: SocketAddr, _backlog: i32) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn bind_assigns_ephemeral_port() {
        let listener = LinkListener::bind(loopback()).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn try_accept_without_pending_returns_none() {
        let listener = LinkListener::bind(loopback()).unwrap();
        assert!(listener.try_accept().unwrap().is_none());
    }

    #[test]
    fn accept_timeout_expires_without_peer() {
        let listener = LinkListener::bind(loopback()).unwrap();
        let start = std::time::Instant::now();
        let accepted = listener
            .accept_timeout(Duration::from_millis(50))
            .unwrap();
        assert!(accepted.is_none());
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn accept_timeout_returns_blocking_link() {
        let listener = LinkListener::bind(loopback()).unwrap();
        let addr = listener.local_addr();

        let handle = std::thread::spawn(move || {
            let mut client = TcpStream::connect(addr).unwrap();
            client.write_all(b"ping").unwrap();
        });

        let (mut link, peer) = listener
            .accept_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("connection should be pending");
        assert!(peer.ip().is_loopback());

        // Blocking read: must not fail with WouldBlock.
        let mut buf = [0u8; 4];
        link.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        handle.join().unwrap();
    }

    #[test]
    fn rebind_after_drop_succeeds_with_reuse() {
        let listener = LinkListener::bind(loopback()).unwrap();
        let addr = listener.local_addr();

        // Leave a connection behind so the port passes through TIME_WAIT.
        let client = TcpStream::connect(addr).unwrap();
        let accepted = listener
            .accept_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("connection should be pending");
        drop(accepted);
        drop(client);
        drop(listener);

        let again = LinkListener::bind(addr).unwrap();
        assert_eq!(again.local_addr(), addr);
    }

    #[test]
    fn bind_conflict_is_bind_error() {
        let first = LinkListener::bind(loopback()).unwrap();
        let err = LinkListener::bind(first.local_addr()).unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }
}
