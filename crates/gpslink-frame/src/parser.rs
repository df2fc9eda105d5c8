//! Resynchronizing frame parser.
//!
//! Consumes a byte stream one byte at a time, in chunks of any size, and
//! reports complete frames as [`ParserEvent`]s. It keeps no lookahead: the
//! only state is the current [`ParserState`] plus fixed buffers for one
//! payload and one checksum trailer.
//!
//! ```text
//!             0xFE                0x34               28 bytes            4 bytes
//!   Init ──────────▶ AwaitType ─────────▶ AwaitPayload ────────▶ AwaitChecksum ──▶ Init
//!    ▲  ◀── other ──     │                                          (Record or
//!    │   (resync,        │ 0x23                                      ChecksumMismatch)
//!    │   re-dispatch)    ▼
//!    └── non-zero ── NoFixSeen ── 4 × 0x00 ──▶ Init
//!        (re-dispatch)
//! ```
//!
//! A byte that ends `AwaitType` or `NoFixSeen` without belonging to the
//! current frame is examined again from `Init`, so a delimiter hidden in
//! noise (`FE FE 34 ...`) or a no-fix frame sent without its zero trailer
//! never costs the following frame.

use crate::codec::{decode_payload, FrameType, CHECKSUM_SIZE, DELIMITER};
use crate::record::{GpsRecord, GPS_RECORD_SIZE};
use crate::wire::checksum;

/// Where the parser is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Hunting for a delimiter.
    Init,
    /// Delimiter seen, next byte is the frame type.
    AwaitType,
    /// No-fix frame seen; consuming its all-zero checksum trailer.
    NoFixSeen,
    /// Collecting the 28-byte GPS payload.
    AwaitPayload,
    /// Collecting the 4-byte checksum trailer.
    AwaitChecksum,
}

/// Something the parser recognised on the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParserEvent {
    /// A GPS frame whose checksum matched.
    Record(GpsRecord),
    /// A no-fix frame; carries no record.
    NoFix,
    /// A GPS frame whose trailer did not match its payload. The frame is
    /// dropped.
    ChecksumMismatch { expected: u32, received: u32 },
}

impl ParserEvent {
    pub fn into_record(self) -> Option<GpsRecord> {
        match self {
            ParserEvent::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Running counters for one parser instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    pub records: u64,
    pub no_fix: u64,
    pub checksum_failures: u64,
    pub malformed_payloads: u64,
    /// Bytes thrown away while hunting for a frame.
    pub discarded_bytes: u64,
}

enum Step {
    Done(Option<ParserEvent>),
    Redispatch,
}

/// Per-connection frame parser.
#[derive(Debug, Clone)]
pub struct StreamParser {
    state: ParserState,
    payload: [u8; GPS_RECORD_SIZE],
    payload_len: usize,
    trailer: [u8; CHECKSUM_SIZE],
    trailer_len: usize,
    nofix_zeros: usize,
    stats: ParserStats,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Init,
            payload: [0; GPS_RECORD_SIZE],
            payload_len: 0,
            trailer: [0; CHECKSUM_SIZE],
            trailer_len: 0,
            nofix_zeros: 0,
            stats: ParserStats::default(),
        }
    }

    /// Consume one byte.
    pub fn push(&mut self, byte: u8) -> Option<ParserEvent> {
        loop {
            match self.step(byte) {
                Step::Done(event) => return event,
                Step::Redispatch => continue,
            }
        }
    }

    /// Consume `bytes`, yielding events as frames complete.
    ///
    /// Bytes are fed lazily: dropping the iterator early leaves the rest of
    /// the slice unconsumed.
    pub fn feed<'p, 'b>(&'p mut self, bytes: &'b [u8]) -> Events<'p, 'b> {
        Events {
            parser: self,
            bytes: bytes.iter(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// True while part of a frame is buffered and more bytes are required
    /// to finish it.
    pub fn in_frame(&self) -> bool {
        matches!(
            self.state,
            ParserState::AwaitType | ParserState::AwaitPayload | ParserState::AwaitChecksum
        )
    }

    /// Counters since construction (not cleared by [`reset`](Self::reset)).
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Abandon any partial frame and hunt for the next delimiter.
    pub fn reset(&mut self) {
        self.state = ParserState::Init;
        self.payload_len = 0;
        self.trailer_len = 0;
        self.nofix_zeros = 0;
    }

    fn step(&mut self, byte: u8) -> Step {
        match self.state {
            ParserState::Init => {
                if byte == DELIMITER {
                    self.state = ParserState::AwaitType;
                } else {
                    self.stats.discarded_bytes += 1;
                }
                Step::Done(None)
            }
            ParserState::AwaitType => match FrameType::from_byte(byte) {
                Some(FrameType::Gps) => {
                    self.payload_len = 0;
                    self.state = ParserState::AwaitPayload;
                    Step::Done(None)
                }
                Some(FrameType::NoFix) => {
                    self.nofix_zeros = 0;
                    self.state = ParserState::NoFixSeen;
                    self.stats.no_fix += 1;
                    Step::Done(Some(ParserEvent::NoFix))
                }
                None => {
                    // The delimiter was noise; look at this byte afresh.
                    self.stats.discarded_bytes += 1;
                    self.state = ParserState::Init;
                    Step::Redispatch
                }
            },
            ParserState::NoFixSeen => {
                if byte == 0 {
                    self.nofix_zeros += 1;
                    if self.nofix_zeros == CHECKSUM_SIZE {
                        self.state = ParserState::Init;
                    }
                    Step::Done(None)
                } else {
                    self.state = ParserState::Init;
                    Step::Redispatch
                }
            }
            ParserState::AwaitPayload => {
                self.payload[self.payload_len] = byte;
                self.payload_len += 1;
                if self.payload_len == GPS_RECORD_SIZE {
                    self.trailer_len = 0;
                    self.state = ParserState::AwaitChecksum;
                }
                Step::Done(None)
            }
            ParserState::AwaitChecksum => {
                self.trailer[self.trailer_len] = byte;
                self.trailer_len += 1;
                if self.trailer_len < CHECKSUM_SIZE {
                    return Step::Done(None);
                }
                self.state = ParserState::Init;
                Step::Done(self.finish_gps_frame())
            }
        }
    }

    fn finish_gps_frame(&mut self) -> Option<ParserEvent> {
        let received = u32::from_be_bytes(self.trailer);
        let expected = checksum(&self.payload);
        if received != expected {
            self.stats.checksum_failures += 1;
            return Some(ParserEvent::ChecksumMismatch { expected, received });
        }

        match decode_payload(&self.payload) {
            Ok(record) => {
                self.stats.records += 1;
                Some(ParserEvent::Record(record))
            }
            Err(err) => {
                tracing::debug!(error = %err, "dropping undecodable payload");
                self.stats.malformed_payloads += 1;
                None
            }
        }
    }
}

/// Iterator returned by [`StreamParser::feed`].
pub struct Events<'p, 'b> {
    parser: &'p mut StreamParser,
    bytes: std::slice::Iter<'b, u8>,
}

impl Iterator for Events<'_, '_> {
    type Item = ParserEvent;

    fn next(&mut self) -> Option<ParserEvent> {
        for &byte in self.bytes.by_ref() {
            if let Some(event) = self.parser.push(byte) {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_gps_frame, encode_nofix_frame, GPS_FRAME_SIZE, TYPE_GPS};

    fn sample(n: u32) -> GpsRecord {
        let n = n as f32;
        GpsRecord::new(
            37.7749 + f64::from(n) * 0.001,
            -122.4194,
            15.2 + n,
            5.0,
            270.0,
        )
    }

    fn gps_frame(record: &GpsRecord) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_gps_frame(record, &mut buf).unwrap();
        buf.to_vec()
    }

    fn records(parser: &mut StreamParser, bytes: &[u8]) -> Vec<GpsRecord> {
        parser
            .feed(bytes)
            .filter_map(ParserEvent::into_record)
            .collect()
    }

    #[test]
    fn single_frame_yields_record() {
        let mut parser = StreamParser::new();
        let got = records(&mut parser, &gps_frame(&sample(0)));
        assert_eq!(got, vec![sample(0)]);
        assert_eq!(parser.state(), ParserState::Init);
        assert_eq!(parser.stats().records, 1);
    }

    #[test]
    fn leading_garbage_is_discarded_one_byte_at_a_time() {
        let mut wire = vec![0x00, 0x00];
        wire.extend(gps_frame(&sample(1)));

        let mut parser = StreamParser::new();
        assert_eq!(parser.push(0x00), None);
        assert_eq!(parser.state(), ParserState::Init);
        assert_eq!(parser.push(0x00), None);
        assert_eq!(parser.state(), ParserState::Init);

        let got = records(&mut parser, &wire[2..]);
        assert_eq!(got, vec![sample(1)]);
        assert_eq!(parser.stats().discarded_bytes, 2);
    }

    #[test]
    fn back_to_back_frames_in_one_burst() {
        let mut wire = Vec::new();
        for n in 0..3 {
            wire.extend(gps_frame(&sample(n)));
        }

        let mut parser = StreamParser::new();
        let got = records(&mut parser, &wire);
        assert_eq!(got, vec![sample(0), sample(1), sample(2)]);
    }

    #[test]
    fn nofix_frame_is_silent() {
        let mut parser = StreamParser::new();
        let mut buf = BytesMut::new();
        encode_nofix_frame(&mut buf);

        let events: Vec<_> = parser.feed(&buf).collect();
        assert_eq!(events, vec![ParserEvent::NoFix]);
        assert_eq!(parser.state(), ParserState::Init);

        let got = records(&mut parser, &gps_frame(&sample(2)));
        assert_eq!(got, vec![sample(2)]);
    }

    #[test]
    fn bare_nofix_header_leaves_parser_ready() {
        let mut wire = vec![0xFE, 0x23];
        wire.extend(gps_frame(&sample(3)));

        let mut parser = StreamParser::new();
        let events: Vec<_> = parser.feed(&wire).collect();
        assert_eq!(
            events,
            vec![ParserEvent::NoFix, ParserEvent::Record(sample(3))]
        );
    }

    #[test]
    fn short_reads_assemble_identically() {
        let mut wire = vec![0x13, 0x37];
        for n in 0..2 {
            wire.extend(gps_frame(&sample(n)));
        }

        let mut whole = StreamParser::new();
        let expected = records(&mut whole, &wire);

        let mut bytewise = StreamParser::new();
        let mut got = Vec::new();
        for byte in &wire {
            got.extend(records(&mut bytewise, std::slice::from_ref(byte)));
        }
        assert_eq!(got, expected);

        for split in 1..wire.len() {
            let mut parser = StreamParser::new();
            let mut got = records(&mut parser, &wire[..split]);
            got.extend(records(&mut parser, &wire[split..]));
            assert_eq!(got, expected, "split at {split}");
        }
    }

    #[test]
    fn partial_frame_is_held_between_chunks() {
        let wire = gps_frame(&sample(4));
        let mut parser = StreamParser::new();

        assert!(records(&mut parser, &wire[..10]).is_empty());
        assert_eq!(parser.state(), ParserState::AwaitPayload);
        assert!(parser.in_frame());

        assert!(records(&mut parser, &wire[10..31]).is_empty());
        assert_eq!(parser.state(), ParserState::AwaitChecksum);

        assert_eq!(records(&mut parser, &wire[31..]), vec![sample(4)]);
        assert!(!parser.in_frame());
    }

    #[test]
    fn checksum_mismatch_drops_frame_and_recovers() {
        let mut corrupted = gps_frame(&sample(5));
        corrupted[7] ^= 0x01;
        let mut wire = corrupted;
        wire.extend(gps_frame(&sample(6)));

        let mut parser = StreamParser::new();
        let events: Vec<_> = parser.feed(&wire).collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ParserEvent::ChecksumMismatch { .. }));
        assert_eq!(events[1], ParserEvent::Record(sample(6)));
        assert_eq!(parser.stats().checksum_failures, 1);
    }

    #[test]
    fn corrupted_trailer_is_reported() {
        let mut wire = gps_frame(&sample(7));
        let last = wire.len() - 1;
        wire[last] = wire[last].wrapping_add(1);

        let mut parser = StreamParser::new();
        let events: Vec<_> = parser.feed(&wire).collect();
        match events.as_slice() {
            [ParserEvent::ChecksumMismatch { expected, received }] => {
                assert_eq!(received.wrapping_sub(*expected), 1);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn invalid_type_byte_resyncs() {
        let mut wire = vec![0xFE, 0x99, 0x01];
        wire.extend(gps_frame(&sample(8)));

        let mut parser = StreamParser::new();
        assert_eq!(records(&mut parser, &wire), vec![sample(8)]);
        assert_eq!(parser.stats().discarded_bytes, 3);
    }

    #[test]
    fn doubled_delimiter_still_finds_frame() {
        let mut wire = vec![0xFE];
        wire.extend(gps_frame(&sample(9)));

        let mut parser = StreamParser::new();
        assert_eq!(records(&mut parser, &wire), vec![sample(9)]);
    }

    #[test]
    fn truncated_frame_then_new_frame_loses_only_the_truncated_one() {
        // A frame cut short is completed by the next frame's bytes and fails
        // its checksum; the stream re-aligns on a later frame.
        let first = gps_frame(&sample(10));
        let mut wire = first[..GPS_FRAME_SIZE - 10].to_vec();
        for n in 11..14 {
            wire.extend(gps_frame(&sample(n)));
        }

        let mut parser = StreamParser::new();
        let got = records(&mut parser, &wire);
        assert!(got.contains(&sample(13)));
        assert!(!got.contains(&sample(10)));
    }

    #[test]
    fn reset_abandons_partial_frame() {
        let wire = gps_frame(&sample(14));
        let mut parser = StreamParser::new();
        let _ = records(&mut parser, &wire[..5]);
        assert!(parser.in_frame());

        parser.reset();
        assert_eq!(parser.state(), ParserState::Init);
        assert_eq!(records(&mut parser, &wire), vec![sample(14)]);
    }

    #[test]
    fn gps_type_byte_outside_frame_is_noise() {
        let mut parser = StreamParser::new();
        assert!(records(&mut parser, &[TYPE_GPS, 0x23, 0x00]).is_empty());
        assert_eq!(parser.state(), ParserState::Init);
        assert_eq!(parser.stats().discarded_bytes, 3);
    }
}
