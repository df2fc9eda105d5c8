/// Errors that can occur during value packing and frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A payload did not have the fixed GPS record width.
    #[error("malformed payload ({len} bytes, expected {expected})")]
    MalformedPayload { len: usize, expected: usize },

    /// A float field was NaN or infinite; the packer has no encoding for it.
    #[error("field `{field}` is not finite")]
    NonFinite { field: &'static str },

    /// A pack/unpack format string did not match the supplied values.
    #[error("format error: {0}")]
    Format(String),

    /// The buffer ended before the format string was satisfied.
    #[error("buffer truncated (needed {needed} bytes at offset {offset}, have {len})")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed (possibly in the middle of a frame).
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
