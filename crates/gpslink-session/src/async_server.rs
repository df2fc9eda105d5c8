//! Tokio rendition of the server session: one task per connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use gpslink_frame::{FrameError, GpsCodec};
use gpslink_transport::{resolve, LinkListener, TransportError};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::registry::{ConnectionEnd, ConnectionInfo, ConnectionRegistry, ConnectionSummary};
use crate::sink::RecordSink;

/// Bound async server, ready to [`run`](Self::run).
pub struct AsyncServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    read_timeout: Option<Duration>,
    sink: Arc<dyn RecordSink>,
}

impl AsyncServer {
    /// Bind with the same socket options as the blocking server.
    ///
    /// Must be called inside a tokio runtime.
    pub fn bind(config: &ServerConfig, sink: Arc<dyn RecordSink>) -> Result<Self> {
        let addr = resolve(&config.bind_host, config.port)?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::NoAddress {
                host: config.bind_host.clone(),
                port: config.port,
            })?;
        let std_listener = LinkListener::bind_with_backlog(addr, config.backlog)?.into_std();
        let listener = TcpListener::from_std(std_listener).map_err(TransportError::Io)?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;

        Ok(Self {
            listener,
            local_addr,
            read_timeout: config.frame.read_timeout,
            sink,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept until `cancel` fires, then stop every connection task.
    ///
    /// Returns the summary of every connection served, including those that
    /// ended before cancellation, in id order.
    pub async fn run(
        self,
        cancel: CancellationToken,
    ) -> Result<Vec<(ConnectionInfo, ConnectionSummary)>> {
        let mut registry = ConnectionRegistry::new();
        let mut tasks = JoinSet::new();
        let mut finished = Vec::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    let info = registry.register(peer_addr)?;
                    info!(connection_id = info.id, peer = %peer_addr, "connection accepted");
                    tasks.spawn(serve_stream(
                        info,
                        stream,
                        self.read_timeout,
                        Arc::clone(&self.sink),
                        cancel.child_token(),
                    ));
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Ok((info, summary)) = joined {
                        log_finished(&info, &summary);
                        finished.push((info, summary));
                    }
                }
            }
        }

        info!(local_addr = %self.local_addr, "listener closed");
        while let Some(joined) = tasks.join_next().await {
            if let Ok(done) = joined {
                finished.push(done);
            }
        }
        finished.sort_by_key(|(info, _)| info.id);
        Ok(finished)
    }
}

/// Bind and serve until `cancel` fires.
pub async fn serve_async(
    config: ServerConfig,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
) -> Result<()> {
    AsyncServer::bind(&config, sink)?.run(cancel).await?;
    Ok(())
}

async fn serve_stream(
    info: ConnectionInfo,
    stream: TcpStream,
    read_timeout: Option<Duration>,
    sink: Arc<dyn RecordSink>,
    cancel: CancellationToken,
) -> (ConnectionInfo, ConnectionSummary) {
    let id = info.id;
    let mut framed = FramedRead::new(stream, GpsCodec::new());

    let end = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break ConnectionEnd::Closed,
            next = next_with_timeout(&mut framed, read_timeout) => next,
        };
        match next {
            Some(Ok(record)) => {
                debug!(connection_id = id, %record, "record");
                sink.deliver(id, &record);
            }
            None | Some(Err(FrameError::ConnectionClosed)) => {
                info!(connection_id = id, peer = %info.peer_addr, "connection closed by peer");
                break ConnectionEnd::Closed;
            }
            Some(Err(err)) => {
                warn!(connection_id = id, peer = %info.peer_addr, error = %err, "dropping connection");
                break ConnectionEnd::Failed(err.to_string());
            }
        }
    };

    let stats = framed.decoder().stats();
    let summary = ConnectionSummary {
        records: stats.records,
        no_fix: stats.no_fix,
        checksum_failures: stats.checksum_failures,
        discarded_bytes: stats.discarded_bytes,
        end,
    };
    (info, summary)
}

async fn next_with_timeout(
    framed: &mut FramedRead<TcpStream, GpsCodec>,
    read_timeout: Option<Duration>,
) -> Option<std::result::Result<gpslink_frame::GpsRecord, FrameError>> {
    match read_timeout {
        None => framed.next().await,
        Some(limit) => match tokio::time::timeout(limit, framed.next()).await {
            Ok(next) => next,
            Err(_) => Some(Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "read timed out",
            )))),
        },
    }
}

fn log_finished(info: &ConnectionInfo, summary: &ConnectionSummary) {
    info!(
        connection_id = info.id,
        records = summary.records,
        checksum_failures = summary.checksum_failures,
        end = ?summary.end,
        "connection finished"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use bytes::BytesMut;
    use gpslink_frame::{encode_gps_frame, encode_nofix_frame, GpsRecord};
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn serves_records_until_cancelled() {
        let (tx, rx) = mpsc::channel::<(u32, GpsRecord)>();
        let config = ServerConfig::new("127.0.0.1", 0);
        let server = AsyncServer::bind(&config, Arc::new(tx)).unwrap();
        let addr = server.local_addr();

        let cancel = CancellationToken::new();
        let running = tokio::spawn(server.run(cancel.clone()));

        let record = GpsRecord::new(35.6762, 139.6503, 40.0, 12.0, 45.0);
        let mut wire = BytesMut::new();
        encode_nofix_frame(&mut wire);
        encode_gps_frame(&record, &mut wire).unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&wire).await.unwrap();

        let delivered = tokio::task::spawn_blocking(move || {
            rx.recv_timeout(Duration::from_secs(5)).unwrap()
        })
        .await
        .unwrap();
        assert_eq!(delivered, (1, record));

        cancel.cancel();
        let finished = running.await.unwrap().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].0.id, 1);
        assert_eq!(finished[0].1.records, 1);
        assert_eq!(finished[0].1.no_fix, 1);
    }

    #[tokio::test]
    async fn summaries_survive_repeated_cancellation() {
        for _ in 0..20 {
            let (tx, rx) = mpsc::channel::<(u32, GpsRecord)>();
            let server =
                AsyncServer::bind(&ServerConfig::new("127.0.0.1", 0), Arc::new(tx)).unwrap();
            let addr = server.local_addr();
            let cancel = CancellationToken::new();
            let running = tokio::spawn(server.run(cancel.clone()));

            let record = GpsRecord::new(1.0, 2.0, 3.0, 4.0, 5.0);
            let mut wire = BytesMut::new();
            encode_gps_frame(&record, &mut wire).unwrap();
            let mut client = TcpStream::connect(addr).await.unwrap();
            client.write_all(&wire).await.unwrap();
            tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)).unwrap())
                .await
                .unwrap();

            cancel.cancel();
            let finished = running.await.unwrap().unwrap();
            assert_eq!(finished.len(), 1);
            assert_eq!(finished[0].1.records, 1);
        }
    }

    #[tokio::test]
    async fn read_timeout_drops_idle_connection() {
        let (tx, _rx) = mpsc::channel::<(u32, GpsRecord)>();
        let mut config = ServerConfig::new("127.0.0.1", 0);
        config.frame.read_timeout = Some(Duration::from_millis(50));
        let server = AsyncServer::bind(&config, Arc::new(tx)).unwrap();
        let addr = server.local_addr();

        let cancel = CancellationToken::new();
        let running = tokio::spawn(server.run(cancel.clone()));

        let _client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        cancel.cancel();
        let finished = running.await.unwrap().unwrap();
        assert_eq!(finished.len(), 1);
        assert!(matches!(finished[0].1.end, ConnectionEnd::Failed(_)));
    }
}
