//! Minimal collector: accepts senders and prints every fix with its
//! connection id until Ctrl-C.
//!
//! Run with:
//!   cargo run --example collector
//!
//! In another terminal:
//!   gpspipe -w | cargo run --features cli -- send 127.0.0.1

use std::sync::atomic::AtomicBool;

use gpslink::frame::GpsRecord;
use gpslink::session::{ServerConfig, ServerSession, DEFAULT_PORT};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink = |connection_id: u32, record: &GpsRecord| {
        println!("[{connection_id}] {record}");
    };
    let mut server = ServerSession::new(ServerConfig::new("127.0.0.1", DEFAULT_PORT), sink);
    let addr = server.start()?;
    eprintln!("Listening on {addr}");

    // No signal handling here; the process exits on Ctrl-C.
    let running = AtomicBool::new(true);
    server.run(&running)?;
    Ok(())
}
