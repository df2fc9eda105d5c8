//! Client and server sessions for gpslink.
//!
//! The client connects with a bounded number of attempts, sends GPS and
//! no-fix frames, and gates reconnects behind a cooldown after any failure.
//! The server accepts connections without busy-waiting and runs one worker
//! per connection, handing every decoded record to a [`RecordSink`].

#[cfg(feature = "async")]
pub mod async_server;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod sink;
mod worker;

#[cfg(feature = "async")]
pub use async_server::{serve_async, AsyncServer};
pub use client::{ClientSession, ClientState, ReconnectOutcome};
pub use clock::{Clock, SystemClock};
pub use config::{
    ClientConfig, ServerConfig, DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_RETRY_DELAY,
    DEFAULT_DATAGRAM_GREETING, DEFAULT_PORT, DEFAULT_RECONNECT_COOLDOWN,
};
pub use error::{Result, SessionError};
pub use registry::{ConnectionEnd, ConnectionInfo, ConnectionRegistry, ConnectionSummary};
pub use server::{ServerSession, ServerState};
pub use sink::RecordSink;
