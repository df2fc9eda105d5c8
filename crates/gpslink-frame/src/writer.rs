use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use gpslink_transport::Link;

use crate::codec::{
    encode_frame, encode_gps_frame, encode_nofix_frame, Frame, FrameConfig, GPS_FRAME_SIZE,
};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;
use crate::record::GpsRecord;

/// Writes complete frames to any `Write` stream.
///
/// Each frame goes out in a single write call where the stream allows it,
/// so a datagram link carries exactly one frame per datagram.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(GPS_FRAME_SIZE),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;
        self.write_buffered()
    }

    /// Encode and send one GPS record.
    pub fn send_record(&mut self, record: &GpsRecord) -> Result<()> {
        self.buf.clear();
        encode_gps_frame(record, &mut self.buf)?;
        self.write_buffered()
    }

    /// Send a no-fix frame.
    pub fn send_no_fix(&mut self) -> Result<()> {
        self.buf.clear();
        encode_nofix_frame(&mut self.buf);
        self.write_buffered()
    }

    /// Write raw bytes that are not a frame, such as a datagram greeting.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if self.is_retryable(&err) => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if self.is_retryable(&err) => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// `WouldBlock` is retried only without a write timeout; with one set,
    /// it is how an expired `SO_SNDTIMEO` surfaces on Unix.
    fn is_retryable(&self, err: &std::io::Error) -> bool {
        err.kind() == ErrorKind::WouldBlock && self.config.write_timeout.is_none()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<Link> {
    /// Create a frame writer for a [`Link`] and apply the write timeout from
    /// config.
    pub fn with_config_link(inner: Link, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
