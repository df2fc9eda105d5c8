use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::pack::{pack, unpack, Field};
use crate::record::{GpsRecord, GPS_RECORD_SIZE};
use crate::wire::checksum;

/// Sentinel byte that opens every frame.
pub const DELIMITER: u8 = 0xFE;

/// Type byte of a frame carrying a GPS fix.
pub const TYPE_GPS: u8 = 0x34;

/// Type byte of a frame reporting that the receiver has no fix.
pub const TYPE_NOFIX: u8 = 0x23;

/// Delimiter + type.
pub const HEADER_SIZE: usize = 2;

/// Checksum trailer width.
pub const CHECKSUM_SIZE: usize = 4;

/// Full GPS frame: header + 28-byte payload + checksum = 34 bytes.
pub const GPS_FRAME_SIZE: usize = HEADER_SIZE + GPS_RECORD_SIZE + CHECKSUM_SIZE;

/// Full no-fix frame: header + checksum over zero bytes = 6 bytes.
pub const NOFIX_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Payload layout: latitude, longitude (f64), altitude, speed, heading (f32).
pub const GPS_PAYLOAD_FORMAT: &str = "ddfff";

/// Frame type carried in the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Gps,
    NoFix,
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            TYPE_GPS => Some(FrameType::Gps),
            TYPE_NOFIX => Some(FrameType::NoFix),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            FrameType::Gps => TYPE_GPS,
            FrameType::NoFix => TYPE_NOFIX,
        }
    }
}

/// One protocol frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Gps(GpsRecord),
    NoFix,
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Gps(_) => FrameType::Gps,
            Frame::NoFix => FrameType::NoFix,
        }
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        match self {
            Frame::Gps(_) => GPS_FRAME_SIZE,
            Frame::NoFix => NOFIX_FRAME_SIZE,
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬─────────────────────┬──────────────────┐
/// │ Delim    │ Type     │ Payload             │ Checksum (4B BE) │
/// │ 0xFE     │ 34 / 23  │ 28B (GPS) / 0B      │ sum(payload)     │
/// └──────────┴──────────┴─────────────────────┴──────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    match frame {
        Frame::Gps(record) => encode_gps_frame(record, dst),
        Frame::NoFix => {
            encode_nofix_frame(dst);
            Ok(())
        }
    }
}

/// Append a 34-byte GPS frame for `record` to `dst`.
pub fn encode_gps_frame(record: &GpsRecord, dst: &mut BytesMut) -> Result<()> {
    let payload = encode_payload(record)?;
    dst.reserve(GPS_FRAME_SIZE);
    dst.put_u8(DELIMITER);
    dst.put_u8(TYPE_GPS);
    dst.put_slice(&payload);
    dst.put_u32(checksum(&payload));
    Ok(())
}

/// Append a 6-byte no-fix frame to `dst`.
pub fn encode_nofix_frame(dst: &mut BytesMut) {
    dst.reserve(NOFIX_FRAME_SIZE);
    dst.put_u8(DELIMITER);
    dst.put_u8(TYPE_NOFIX);
    dst.put_u32(checksum(&[]));
}

/// Serialize the 28-byte payload of `record`.
pub fn encode_payload(record: &GpsRecord) -> Result<BytesMut> {
    record.validate()?;
    pack(
        GPS_PAYLOAD_FORMAT,
        &[
            Field::F64(record.latitude),
            Field::F64(record.longitude),
            Field::F32(record.altitude),
            Field::F32(record.speed),
            Field::F32(record.heading),
        ],
    )
}

/// Decode an isolated 28-byte payload back into a record.
pub fn decode_payload(payload: &[u8]) -> Result<GpsRecord> {
    if payload.len() != GPS_RECORD_SIZE {
        return Err(FrameError::MalformedPayload {
            len: payload.len(),
            expected: GPS_RECORD_SIZE,
        });
    }

    match unpack(GPS_PAYLOAD_FORMAT, payload)?.as_slice() {
        [Field::F64(latitude), Field::F64(longitude), Field::F32(altitude), Field::F32(speed), Field::F32(heading)] => {
            Ok(GpsRecord {
                latitude: *latitude,
                longitude: *longitude,
                altitude: *altitude,
                speed: *speed,
                heading: *heading,
            })
        }
        other => Err(FrameError::Format(format!(
            "unexpected payload fields {other:?}"
        ))),
    }
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone, Default)]
pub struct FrameConfig {
    /// Read timeout for blocking operations.
    ///
    /// `None` keeps the blocking contract: a peer that stalls mid-frame
    /// holds the reader indefinitely.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
    /// Bytes written back to the peer whenever the reader has to block for
    /// the rest of an in-flight frame. `None` disables the probe.
    pub liveness_ack: Option<Bytes>,
}
