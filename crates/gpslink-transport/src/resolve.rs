use std::net::{SocketAddr, ToSocketAddrs};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Turns a host name and port into candidate socket addresses.
///
/// Sessions take a resolver instead of calling the system lookup directly
/// so tests can script lookup failures.
pub trait Resolver: Send + Sync {
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>>;
}

/// Resolver backed by the platform's `getaddrinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        resolve(host, port)
    }
}

/// Resolve `host:port`, returning every address in lookup order.
///
/// An empty answer is reported as [`TransportError::NoAddress`].
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::NoAddress {
            host: host.to_string(),
            port,
        });
    }

    debug!(host, port, count = addrs.len(), "resolved address");
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_ipv4_literal() {
        let addrs = resolve("127.0.0.1", 3412).unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:3412".parse().unwrap()]);
    }

    #[test]
    fn resolves_localhost() {
        let addrs = SystemResolver.resolve("localhost", 80).unwrap();
        assert!(addrs.iter().all(|addr| addr.port() == 80));
        assert!(addrs.iter().any(|addr| addr.ip().is_loopback()));
    }

    #[test]
    fn unresolvable_host_is_resolve_error() {
        let err = resolve("host.invalid", 3412).unwrap_err();
        assert!(matches!(err, TransportError::Resolve { .. }));
    }
}
