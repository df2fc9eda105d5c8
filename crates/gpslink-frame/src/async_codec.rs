//! `tokio_util` codec over the stream parser and frame codec.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, encode_gps_frame, Frame};
use crate::error::{FrameError, Result};
use crate::parser::{ParserEvent, ParserStats, StreamParser};
use crate::record::GpsRecord;

/// Decodes GPS records from a byte stream and encodes frames onto one.
///
/// Decoding drops no-fix frames and frames with a bad checksum, exactly like
/// [`FrameReader`](crate::FrameReader).
#[derive(Debug, Default)]
pub struct GpsCodec {
    parser: StreamParser,
}

impl GpsCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ParserStats {
        self.parser.stats()
    }
}

impl Decoder for GpsCodec {
    type Item = GpsRecord;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<GpsRecord>> {
        let mut consumed = src.len();
        let mut found = None;

        for (index, &byte) in src.iter().enumerate() {
            match self.parser.push(byte) {
                Some(ParserEvent::Record(record)) => {
                    consumed = index + 1;
                    found = Some(record);
                    break;
                }
                Some(ParserEvent::ChecksumMismatch { expected, received }) => {
                    tracing::debug!(expected, received, "dropping frame with bad checksum");
                }
                Some(ParserEvent::NoFix) | None => {}
            }
        }

        src.advance(consumed);
        Ok(found)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<GpsRecord>> {
        match self.decode(src)? {
            Some(record) => Ok(Some(record)),
            None if self.parser.in_frame() => Err(FrameError::ConnectionClosed),
            None => Ok(None),
        }
    }
}

impl Encoder<&GpsRecord> for GpsCodec {
    type Error = FrameError;

    fn encode(&mut self, record: &GpsRecord, dst: &mut BytesMut) -> Result<()> {
        encode_gps_frame(record, dst)
    }
}

impl Encoder<Frame> for GpsCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&frame, dst)
    }
}
