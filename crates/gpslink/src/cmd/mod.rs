use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use gpslink_session::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_PORT};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept senders and print every received record.
    Serve(ServeArgs),
    /// Stream gpsd TPV reports from a file or stdin to a server.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,
    /// Port to listen on.
    #[arg(long, short = 'p', env = "GPSLINK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Exit after printing N records.
    #[arg(long)]
    pub count: Option<usize>,
    /// Bytes written back before each read while a frame is in flight.
    #[arg(long, value_name = "TEXT")]
    pub liveness_ack: Option<String>,
    /// Drop a connection that stays silent this long (e.g. 30s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub read_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server host name or address.
    #[arg(env = "GPSLINK_SERVER")]
    pub server: String,
    /// Server port.
    #[arg(long, short = 'p', env = "GPSLINK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Send over UDP instead of TCP. `gpslink serve` only accepts TCP, so
    /// this needs an external UDP collector.
    #[arg(long)]
    pub datagram: bool,
    /// Read reports from a file instead of stdin.
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,
    /// Connect attempts before giving up on the initial connect.
    #[arg(long, default_value_t = DEFAULT_CONNECT_ATTEMPTS)]
    pub attempts: u32,
    /// Pause between connect attempts.
    #[arg(long, default_value = "2s")]
    pub retry_delay: String,
    /// Minimum wait after a failure before reconnecting.
    #[arg(long, default_value = "10s")]
    pub cooldown: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
