mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "gpslink", version, about = "Framed GPS telemetry sender and collector")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "gpslink",
            "serve",
            "--port",
            "4100",
            "--count",
            "2",
            "--liveness-ack",
            "ok",
        ])
        .expect("serve args should parse");

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, 4100);
        assert_eq!(args.count, Some(2));
        assert_eq!(args.bind, "0.0.0.0");
    }

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "gpslink",
            "--format",
            "json",
            "send",
            "gps.example",
            "--datagram",
            "--input",
            "/tmp/track.jsonl",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.server, "gps.example");
        assert!(args.datagram);
        assert_eq!(args.attempts, gpslink_session::DEFAULT_CONNECT_ATTEMPTS);
    }

    #[test]
    fn datagram_help_names_udp_collector() {
        use clap::CommandFactory;

        let cli = Cli::command();
        let send = cli
            .find_subcommand("send")
            .expect("send subcommand should exist");
        let datagram = send
            .get_arguments()
            .find(|arg| arg.get_id() == "datagram")
            .expect("--datagram should exist");
        let help = datagram
            .get_help()
            .map(ToString::to_string)
            .unwrap_or_default();
        assert!(help.contains("UDP collector"), "help: {help}");
    }

    #[test]
    fn rejects_non_numeric_port() {
        let err = Cli::try_parse_from(["gpslink", "serve", "--port", "gps"])
            .expect_err("bad port should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
