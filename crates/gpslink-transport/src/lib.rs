//! Socket transport for gpslink.
//!
//! Provides the plumbing every other layer sits on:
//! - host/service resolution ([`resolve`])
//! - connected stream (TCP) and datagram (UDP) links behind one [`Link`] type
//! - a listening socket with address reuse, an explicit backlog and a
//!   readiness wait instead of a busy accept loop ([`LinkListener`])
//!
//! This is the lowest layer of gpslink. Framing lives in `gpslink-frame`.

pub mod error;
pub mod listener;
pub mod resolve;
pub mod traits;

pub use error::{Result, TransportError};
pub use listener::{LinkListener, DEFAULT_BACKLOG};
pub use resolve::{resolve, Resolver, SystemResolver};
pub use traits::{Link, TransportMode};
