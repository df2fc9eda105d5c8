//! Framed GPS telemetry over TCP and UDP.
//!
//! A sender packs each fix into a 34-byte frame (delimiter, type byte,
//! 28-byte IEEE-754 payload, additive checksum) or announces a lost fix
//! with a 6-byte no-fix frame. The receiver runs a byte-at-a-time parser
//! that resynchronizes on the delimiter after any garbage or corruption.
//!
//! # Crate Structure
//!
//! - [`transport`]: name resolution, TCP/UDP links, non-blocking listener
//! - [`frame`]: float packer, frame codec, stream parser, reader/writer
//! - [`session`]: client with bounded retry and reconnect cooldown, threaded
//!   server and connection registry (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use gpslink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use gpslink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use gpslink_session::*;
}
