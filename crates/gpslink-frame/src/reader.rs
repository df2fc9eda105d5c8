use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};

use gpslink_transport::{Link, TransportError};

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::parser::{ParserEvent, ParserStats, StreamParser};
use crate::record::GpsRecord;

/// Bytes requested from the stream per read call.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Reads GPS records from any `Read` stream.
///
/// Short reads are absorbed: the reader keeps reading until a frame
/// completes, so callers only ever see whole records. No-fix frames and
/// frames with a bad checksum are consumed silently.
pub struct FrameReader<T> {
    inner: T,
    parser: StreamParser,
    pending: VecDeque<GpsRecord>,
    config: FrameConfig,
    ack: Option<Box<dyn Write + Send>>,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    ///
    /// `liveness_ack` needs a write half; supply one with
    /// [`set_ack_writer`](Self::set_ack_writer).
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            parser: StreamParser::new(),
            pending: VecDeque::new(),
            config,
            ack: None,
        }
    }

    /// Install the write half used for liveness acks.
    pub fn set_ack_writer(&mut self, writer: Box<dyn Write + Send>) {
        self.ack = Some(writer);
    }

    /// Read the next record (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at EOF, even when a frame
    /// was half received.
    pub fn next_record(&mut self) -> Result<GpsRecord> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(record);
            }

            if self.parser.in_frame() {
                self.send_ack()?;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.parser.in_frame() {
                    tracing::debug!(state = ?self.parser.state(), "peer closed mid-frame");
                }
                return Err(FrameError::ConnectionClosed);
            }

            for event in self.parser.feed(&chunk[..read]) {
                match event {
                    ParserEvent::Record(record) => self.pending.push_back(record),
                    ParserEvent::NoFix => tracing::trace!("no-fix frame"),
                    ParserEvent::ChecksumMismatch { expected, received } => {
                        tracing::debug!(
                            expected = format_args!("{expected:#010x}"),
                            received = format_args!("{received:#010x}"),
                            "dropping frame with bad checksum"
                        );
                    }
                }
            }
        }
    }

    fn send_ack(&mut self) -> Result<()> {
        let (Some(writer), Some(ack)) = (self.ack.as_mut(), self.config.liveness_ack.as_ref())
        else {
            return Ok(());
        };
        writer.write_all(ack).map_err(FrameError::Io)
    }

    /// Parser counters for this stream.
    pub fn stats(&self) -> ParserStats {
        self.parser.stats()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<Link> {
    /// Create a frame reader for a [`Link`], applying the read timeout and
    /// wiring the liveness ack to a clone of the link.
    pub fn with_config_link(inner: Link, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        let ack = match config.liveness_ack {
            Some(_) => Some(inner.try_clone().map_err(transport_to_frame_error)?),
            None => None,
        };
        let mut reader = Self::with_config(inner, config);
        if let Some(ack) = ack {
            reader.set_ack_writer(Box::new(ack));
        }
        Ok(reader)
    }
}

pub(crate) fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
