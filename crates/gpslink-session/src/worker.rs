use std::sync::Arc;

use gpslink_frame::{FrameConfig, FrameError, FrameReader};
use gpslink_transport::Link;
use tracing::{debug, info, warn};

use crate::registry::{ConnectionEnd, ConnectionInfo, ConnectionSummary};
use crate::sink::RecordSink;

/// Drive one accepted connection until it ends.
///
/// Owns the link and its parser; the socket closes when this returns.
pub(crate) fn serve_connection(
    info: &ConnectionInfo,
    link: Link,
    frame: FrameConfig,
    sink: Arc<dyn RecordSink>,
) -> ConnectionSummary {
    let id = info.id;
    let mut reader = match FrameReader::with_config_link(link, frame) {
        Ok(reader) => reader,
        Err(err) => {
            warn!(connection_id = id, error = %err, "could not configure connection");
            return ConnectionSummary {
                records: 0,
                no_fix: 0,
                checksum_failures: 0,
                discarded_bytes: 0,
                end: ConnectionEnd::Failed(err.to_string()),
            };
        }
    };

    let end = loop {
        match reader.next_record() {
            Ok(record) => {
                debug!(connection_id = id, %record, "record");
                sink.deliver(id, &record);
            }
            Err(FrameError::ConnectionClosed) => {
                info!(connection_id = id, peer = %info.peer_addr, "connection closed by peer");
                break ConnectionEnd::Closed;
            }
            Err(err) => {
                warn!(connection_id = id, peer = %info.peer_addr, error = %err, "dropping connection");
                break ConnectionEnd::Failed(err.to_string());
            }
        }
    };

    let stats = reader.stats();
    ConnectionSummary {
        records: stats.records,
        no_fix: stats.no_fix,
        checksum_failures: stats.checksum_failures,
        discarded_bytes: stats.discarded_bytes,
        end,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::time::{Duration, SystemTime};

    use bytes::BytesMut;
    use gpslink_frame::{encode_gps_frame, encode_nofix_frame, GpsRecord};

    use super::*;

    fn accepted_pair() -> (TcpStream, Link, ConnectionInfo) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer_addr) = listener.accept().unwrap();
        let info = ConnectionInfo {
            id: 9,
            peer_addr,
            accepted_at: SystemTime::now(),
        };
        (client, Link::from_tcp(server), info)
    }

    #[test]
    fn delivers_records_until_peer_closes() {
        let (mut client, link, info) = accepted_pair();
        let (tx, rx) = mpsc::channel::<(u32, GpsRecord)>();

        let worker = std::thread::spawn(move || {
            serve_connection(&info, link, FrameConfig::default(), Arc::new(tx))
        });

        let first = GpsRecord::new(10.0, 20.0, 30.0, 1.0, 45.0);
        let second = GpsRecord::new(10.5, 20.5, 31.0, 2.0, 90.0);
        let mut wire = BytesMut::new();
        encode_gps_frame(&first, &mut wire).unwrap();
        encode_nofix_frame(&mut wire);
        wire.extend_from_slice(&[0x55, 0x66]);
        encode_gps_frame(&second, &mut wire).unwrap();
        client.write_all(&wire).unwrap();
        drop(client);

        let summary = worker.join().unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.no_fix, 1);
        assert_eq!(summary.discarded_bytes, 2);
        assert_eq!(summary.end, ConnectionEnd::Closed);

        let delivered: Vec<_> = rx.try_iter().collect();
        assert_eq!(delivered, vec![(9, first), (9, second)]);
    }

    #[test]
    fn read_timeout_ends_connection() {
        let (_client, link, info) = accepted_pair();
        let frame = FrameConfig {
            read_timeout: Some(Duration::from_millis(30)),
            ..FrameConfig::default()
        };
        let sink: Arc<dyn RecordSink> = Arc::new(|_: u32, _: &GpsRecord| {});

        let summary = serve_connection(&info, link, frame, sink);
        assert!(matches!(summary.end, ConnectionEnd::Failed(_)));
        assert_eq!(summary.records, 0);
    }
}
