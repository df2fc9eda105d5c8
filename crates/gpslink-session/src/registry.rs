use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::SystemTime;

use crate::error::{Result, SessionError};

/// Identity of one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Starts at 1, strictly increasing, never reused.
    pub id: u32,
    pub peer_addr: SocketAddr,
    pub accepted_at: SystemTime,
}

/// How a connection worker finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The peer closed the connection.
    Closed,
    /// A read error or timeout ended the connection.
    Failed(String),
    /// The worker thread panicked.
    Panicked,
}

/// What a connection worker reports when it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub records: u64,
    pub no_fix: u64,
    pub checksum_failures: u64,
    pub discarded_bytes: u64,
    pub end: ConnectionEnd,
}

impl ConnectionSummary {
    pub(crate) fn panicked() -> Self {
        Self {
            records: 0,
            no_fix: 0,
            checksum_failures: 0,
            discarded_bytes: 0,
            end: ConnectionEnd::Panicked,
        }
    }
}

/// Connection ids and worker handles, owned by the acceptor.
///
/// Workers never see the registry; they report through the
/// [`ConnectionSummary`] their thread returns.
#[derive(Debug)]
pub struct ConnectionRegistry {
    next_id: Option<u32>,
    workers: Vec<(ConnectionInfo, JoinHandle<ConnectionSummary>)>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(first_id: u32) -> Self {
        Self {
            next_id: Some(first_id),
            workers: Vec::new(),
        }
    }

    /// Assign the next id to a freshly accepted peer.
    pub fn register(&mut self, peer_addr: SocketAddr) -> Result<ConnectionInfo> {
        let id = self.next_id.ok_or(SessionError::RegistryExhausted)?;
        self.next_id = id.checked_add(1);
        Ok(ConnectionInfo {
            id,
            peer_addr,
            accepted_at: SystemTime::now(),
        })
    }

    /// Keep the worker handle for a registered connection.
    pub fn track(&mut self, info: ConnectionInfo, handle: JoinHandle<ConnectionSummary>) {
        self.workers.push((info, handle));
    }

    /// Join and remove every worker that has finished.
    pub fn reap(&mut self) -> Vec<(ConnectionInfo, ConnectionSummary)> {
        let mut finished = Vec::new();
        let mut index = 0;
        while index < self.workers.len() {
            if self.workers[index].1.is_finished() {
                let (info, handle) = self.workers.swap_remove(index);
                let summary = handle.join().unwrap_or_else(|_| ConnectionSummary::panicked());
                finished.push((info, summary));
            } else {
                index += 1;
            }
        }
        finished.sort_by_key(|(info, _)| info.id);
        finished
    }

    /// Workers tracked and not yet reaped.
    pub fn active_count(&self) -> usize {
        self.workers.len()
    }

    /// Id the next connection will receive, `None` once exhausted.
    pub fn next_id(&self) -> Option<u32> {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn closed() -> ConnectionSummary {
        ConnectionSummary {
            records: 2,
            no_fix: 0,
            checksum_failures: 0,
            discarded_bytes: 0,
            end: ConnectionEnd::Closed,
        }
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut registry = ConnectionRegistry::new();
        assert_eq!(registry.next_id(), Some(1));
        assert_eq!(registry.register(peer()).unwrap().id, 1);
        assert_eq!(registry.register(peer()).unwrap().id, 2);
        assert_eq!(registry.next_id(), Some(3));
    }

    #[test]
    fn ids_are_not_reused_after_reap() {
        let mut registry = ConnectionRegistry::new();
        let info = registry.register(peer()).unwrap();
        let handle = std::thread::spawn(closed);
        registry.track(info, handle);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut reaped = Vec::new();
        while reaped.is_empty() && Instant::now() < deadline {
            reaped = registry.reap();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].0.id, 1);
        assert_eq!(reaped[0].1, closed());
        assert_eq!(registry.active_count(), 0);

        assert_eq!(registry.register(peer()).unwrap().id, 2);
    }

    #[test]
    fn running_workers_are_kept() {
        let mut registry = ConnectionRegistry::new();
        let info = registry.register(peer()).unwrap();
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            let _ = rx.recv();
            closed()
        });
        registry.track(info, handle);

        assert!(registry.reap().is_empty());
        assert_eq!(registry.active_count(), 1);
        drop(tx);
    }

    #[test]
    fn panicked_worker_is_reported() {
        let mut registry = ConnectionRegistry::new();
        let info = registry.register(peer()).unwrap();
        let handle = std::thread::spawn(|| -> ConnectionSummary { panic!("worker blew up") });
        registry.track(info, handle);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut reaped = Vec::new();
        while reaped.is_empty() && Instant::now() < deadline {
            reaped = registry.reap();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(reaped[0].1.end, ConnectionEnd::Panicked);
    }

    #[test]
    fn exhausted_id_space_is_an_error() {
        let mut registry = ConnectionRegistry::starting_at(u32::MAX);
        assert_eq!(registry.register(peer()).unwrap().id, u32::MAX);
        assert_eq!(registry.next_id(), None);
        assert!(matches!(
            registry.register(peer()),
            Err(SessionError::RegistryExhausted)
        ));
    }
}
