use std::sync::mpsc::Sender;

use gpslink_frame::GpsRecord;

/// Receives every record decoded by a server session.
///
/// Called from connection workers, concurrently for different connections
/// and in wire order within one connection.
pub trait RecordSink: Send + Sync {
    fn deliver(&self, connection_id: u32, record: &GpsRecord);
}

impl<F> RecordSink for F
where
    F: Fn(u32, &GpsRecord) + Send + Sync,
{
    fn deliver(&self, connection_id: u32, record: &GpsRecord) {
        self(connection_id, record)
    }
}

impl RecordSink for Sender<(u32, GpsRecord)> {
    fn deliver(&self, connection_id: u32, record: &GpsRecord) {
        if self.send((connection_id, *record)).is_err() {
            tracing::debug!(connection_id, "record receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::mpsc;

    use super::*;

    fn record() -> GpsRecord {
        GpsRecord::new(1.0, 2.0, 3.0, 4.0, 5.0)
    }

    #[test]
    fn closure_sink() {
        let seen = AtomicU32::new(0);
        let sink = |id: u32, rec: &GpsRecord| {
            assert_eq!(*rec, record());
            seen.fetch_add(id, Ordering::SeqCst);
        };
        sink.deliver(7, &record());
        sink.deliver(3, &record());
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn channel_sink() {
        let (tx, rx) = mpsc::channel::<(u32, GpsRecord)>();
        tx.deliver(4, &record());
        assert_eq!(rx.recv().unwrap(), (4, record()));
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (tx, rx) = mpsc::channel::<(u32, GpsRecord)>();
        drop(rx);
        tx.deliver(1, &record());
    }
}
