//! GPS telemetry framing.
//!
//! Every frame on the wire is:
//! - a `0xFE` delimiter for stream synchronization
//! - a type byte: `0x34` (GPS fix) or `0x23` (no fix)
//! - for GPS frames, a 28-byte big-endian payload
//! - a 4-byte big-endian additive checksum of the payload
//!
//! The [`StreamParser`] recovers frames from an arbitrary byte stream,
//! skipping noise and frames whose checksum does not match. [`FrameReader`]
//! and [`FrameWriter`] drive it over blocking streams; `GpsCodec` does the
//! same for tokio behind the `async` feature.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod pack;
pub mod parser;
pub mod reader;
pub mod record;
pub mod wire;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::GpsCodec;
pub use codec::{
    decode_payload, encode_frame, encode_gps_frame, encode_nofix_frame, encode_payload, Frame,
    FrameConfig, FrameType, DELIMITER, GPS_FRAME_SIZE, NOFIX_FRAME_SIZE, TYPE_GPS, TYPE_NOFIX,
};
pub use error::{FrameError, Result};
pub use parser::{ParserEvent, ParserState, ParserStats, StreamParser};
pub use reader::FrameReader;
pub use record::{GpsRecord, GPS_RECORD_SIZE};
pub use writer::FrameWriter;
