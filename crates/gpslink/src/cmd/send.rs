use std::fs::File;
use std::io::{self, BufRead, BufReader};

use gpslink_frame::GpsRecord;
use gpslink_session::{ClientConfig, ClientSession, ReconnectOutcome, SessionError};
use gpslink_transport::TransportMode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_send_summary, OutputFormat, SendSummary};

/// Below this gpsd `mode` the receiver has no fix (0 unknown, 1 no fix).
const MIN_FIX_MODE: u8 = 2;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = client_config(&args)?;
    let target = config.target();
    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path).map_err(|err| {
            io_error(&format!("failed opening {}", path.display()), err)
        })?)),
        None => Box::new(io::stdin().lock()),
    };

    let mut client = ClientSession::new(config);
    if let Err(err) = client.connect() {
        warn!(target_addr = %target, error = %err, "initial connect failed, continuing disconnected");
    }

    let summary = stream_reports(&mut client, input)?;
    client.disconnect();
    info!(
        target_addr = %target,
        sent = summary.sent,
        dropped = summary.dropped,
        "input exhausted"
    );
    print_send_summary(&target, &summary, format);

    if summary.dropped > 0 {
        Ok(FAILURE)
    } else {
        Ok(SUCCESS)
    }
}

fn client_config(args: &SendArgs) -> CliResult<ClientConfig> {
    let mode = if args.datagram {
        TransportMode::Datagram
    } else {
        TransportMode::Stream
    };
    Ok(ClientConfig::new(args.server.clone(), args.port)
        .with_mode(mode)
        .with_max_connect_attempts(args.attempts)
        .with_connect_retry_delay(parse_duration(&args.retry_delay)?)
        .with_reconnect_cooldown(parse_duration(&args.cooldown)?))
}

/// One line of gpsd JSON output. Only `TPV` reports carry fixes.
#[derive(Debug, Deserialize)]
struct GpsdReport {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    #[serde(rename = "altMSL")]
    alt_msl: Option<f64>,
    speed: Option<f64>,
    track: Option<f64>,
}

#[derive(Debug, PartialEq)]
enum Report {
    Fix(GpsRecord),
    NoFix,
    Skip,
}

fn classify(line: &str) -> Report {
    let line = line.trim();
    if line.is_empty() {
        return Report::Skip;
    }
    let report: GpsdReport = match serde_json::from_str(line) {
        Ok(report) => report,
        Err(err) => {
            debug!(error = %err, "ignoring unparseable line");
            return Report::Skip;
        }
    };
    if report.class != "TPV" {
        return Report::Skip;
    }
    if report.mode < MIN_FIX_MODE {
        return Report::NoFix;
    }

    let (Some(lat), Some(lon), Some(alt), Some(speed), Some(track)) = (
        report.lat,
        report.lon,
        report.alt.or(report.alt_msl),
        report.speed,
        report.track,
    ) else {
        debug!(mode = report.mode, "ignoring TPV report with missing fields");
        return Report::Skip;
    };
    Report::Fix(GpsRecord::new(
        lat,
        lon,
        alt as f32,
        speed as f32,
        track as f32,
    ))
}

fn stream_reports(client: &mut ClientSession, input: Box<dyn BufRead>) -> CliResult<SendSummary> {
    let mut summary = SendSummary::default();

    for line in input.lines() {
        let line = line.map_err(|err| io_error("failed reading input", err))?;
        let report = classify(&line);
        if report == Report::Skip {
            summary.skipped += 1;
            continue;
        }

        if !ensure_connected(client) {
            summary.dropped += 1;
            continue;
        }

        let result = match report {
            Report::Fix(record) => client.send(&record),
            Report::NoFix => client.send_no_fix(),
            Report::Skip => continue,
        };
        match result {
            Ok(()) if matches!(report, Report::NoFix) => summary.no_fix += 1,
            Ok(()) => summary.sent += 1,
            Err(SessionError::Frame(err)) => {
                warn!(error = %err, "skipping unencodable record");
                summary.skipped += 1;
            }
            Err(err) => {
                warn!(error = %err, "send failed, will reconnect after cooldown");
                summary.dropped += 1;
            }
        }
    }

    Ok(summary)
}

fn ensure_connected(client: &mut ClientSession) -> bool {
    match client.try_reconnect() {
        ReconnectOutcome::Connected => {
            info!(target_addr = %client.config().target(), "reconnected");
            true
        }
        ReconnectOutcome::AlreadyConnected => true,
        ReconnectOutcome::CoolingDown { remaining } => {
            debug!(remaining_ms = remaining.as_millis() as u64, "reconnect cooling down");
            false
        }
        ReconnectOutcome::Failed(_) => false,
    }
}
