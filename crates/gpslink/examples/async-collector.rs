//! Tokio collector: one task per sender, stopped by Ctrl-C.
//!
//! Run with:
//!   cargo run --example async-collector --features async

use std::sync::Arc;

use gpslink::frame::GpsRecord;
use gpslink::session::{AsyncServer, RecordSink, ServerConfig, DEFAULT_PORT};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sink: Arc<dyn RecordSink> = Arc::new(|connection_id: u32, record: &GpsRecord| {
        println!("[{connection_id}] {record}");
    });
    let server = AsyncServer::bind(&ServerConfig::new("127.0.0.1", DEFAULT_PORT), sink)?;
    eprintln!("Listening on {}", server.local_addr());

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    for (info, summary) in server.run(cancel).await? {
        eprintln!(
            "connection {} from {}: {} records, {} checksum failures",
            info.id, info.peer_addr, summary.records, summary.checksum_failures
        );
    }
    Ok(())
}
