/// Errors that can occur in client and server sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] gpslink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] gpslink_frame::FrameError),

    /// Every connect attempt failed.
    #[error("could not reach {target} after {attempts} attempts: {last}")]
    ConnectExhausted {
        target: String,
        attempts: u32,
        #[source]
        last: Box<SessionError>,
    },

    /// A send was requested without a live link.
    #[error("not connected")]
    NotConnected,

    /// Writing a frame failed; the link has been dropped.
    #[error("send failed: {source}")]
    Send { source: gpslink_frame::FrameError },

    /// The server was asked to accept while not listening.
    #[error("server is not listening")]
    NotListening,

    /// Connection ids are never reused and the id space is used up.
    #[error("connection id space exhausted")]
    RegistryExhausted,

    /// A connection worker thread could not be started.
    #[error("failed to spawn connection worker: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
