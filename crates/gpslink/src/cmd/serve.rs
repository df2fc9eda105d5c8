use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use gpslink_frame::{FrameConfig, GpsRecord};
use gpslink_session::{ServerConfig, ServerSession};
use tracing::info;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{io_error, session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_record, OutputFormat};

const RECEIVE_POLL: Duration = Duration::from_millis(100);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = server_config(&args)?;
    let (tx, rx) = mpsc::channel::<(u32, GpsRecord)>();
    let mut server = ServerSession::new(config, tx);
    let local_addr = server
        .start()
        .map_err(|err| session_error("bind failed", err))?;
    info!(%local_addr, "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let flag = Arc::clone(&running);
    let acceptor = thread::Builder::new()
        .name("gpslink-accept".to_string())
        .spawn(move || {
            let result = server.run(&flag);
            server.stop();
            result
        })
        .map_err(|err| io_error("accept thread failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(RECEIVE_POLL) {
            Ok((connection_id, record)) => {
                print_record(connection_id, &record, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    running.store(false, Ordering::SeqCst);
                }
            }
            Err(RecvTimeoutError::Timeout) if acceptor.is_finished() => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    running.store(false, Ordering::SeqCst);

    acceptor
        .join()
        .map_err(|_| CliError::new(INTERNAL, "accept thread panicked"))?
        .map_err(|err| session_error("accept loop failed", err))?;
    info!(records = printed, "server stopped");
    Ok(SUCCESS)
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let read_timeout = args
        .read_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;
    let frame = FrameConfig {
        read_timeout,
        liveness_ack: args
            .liveness_ack
            .as_ref()
            .map(|ack| Bytes::copy_from_slice(ack.as_bytes())),
        ..FrameConfig::default()
    };
    Ok(ServerConfig::new(args.bind.clone(), args.port).with_frame_config(frame))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
