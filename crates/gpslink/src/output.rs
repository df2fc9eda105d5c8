use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gpslink_frame::{encode_gps_frame, GpsRecord};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Re-encoded wire frames.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct RecordOutput {
    connection_id: u32,
    latitude: f64,
    longitude: f64,
    altitude: f32,
    speed: f32,
    heading: f32,
    timestamp: String,
}

pub fn print_record(connection_id: u32, record: &GpsRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = RecordOutput {
                connection_id,
                latitude: record.latitude,
                longitude: record.longitude,
                altitude: record.altitude,
                speed: record.speed,
                heading: record.heading,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CONN", "LATITUDE", "LONGITUDE", "ALT", "SPEED", "HEADING"])
                .add_row(vec![
                    connection_id.to_string(),
                    format!("{:.6}", record.latitude),
                    format!("{:.6}", record.longitude),
                    format!("{:.1}", record.altitude),
                    format!("{:.2}", record.speed),
                    format!("{:.1}", record.heading),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("conn={connection_id} {record}");
        }
        OutputFormat::Raw => {
            let mut buf = BytesMut::new();
            if encode_gps_frame(record, &mut buf).is_ok() {
                print_raw(&buf);
            }
        }
    }
}

/// Totals reported by `send` when its input is exhausted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendSummary {
    pub sent: u64,
    pub no_fix: u64,
    pub skipped: u64,
    pub dropped: u64,
}

pub fn print_send_summary(target: &str, summary: &SendSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Out<'a> {
                target: &'a str,
                #[serde(flatten)]
                summary: &'a SendSummary,
            }
            println!(
                "{}",
                serde_json::to_string(&Out { target, summary }).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TARGET", "SENT", "NO FIX", "SKIPPED", "DROPPED"])
                .add_row(vec![
                    target.to_string(),
                    summary.sent.to_string(),
                    summary.no_fix.to_string(),
                    summary.skipped.to_string(),
                    summary.dropped.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{}", summary_line(target, summary));
        }
        // Stdout may be a binary frame stream.
        OutputFormat::Raw => {
            eprintln!("{}", summary_line(target, summary));
        }
    }
}

fn summary_line(target: &str, summary: &SendSummary) -> String {
    format!(
        "target={target} sent={} no_fix={} skipped={} dropped={}",
        summary.sent, summary.no_fix, summary.skipped, summary.dropped
    )
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
