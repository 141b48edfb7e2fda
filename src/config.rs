// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of logship.
//
// logship is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// logship is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with logship.  If not,
// see <http://www.gnu.org/licenses/>.

//! Command-line configuration
//!
//! [`Cli`] is the raw command line, as parsed by [clap]; [`Config`] is the validated result, from
//! which the [`Filter`], [`Renderer`] & [`Sink`] are built. The short flags follow the traditional
//! `logread` tool, which is why `-h` is a hostname rather than a request for help (use `--help`).
//!
//! [clap]: https://docs.rs/clap

use crate::{
    error::{Error, Result},
    filter::Filter,
    formatter::{Classic, Relay, Renderer, Templated, Zone},
    sink::{FileSink, NetworkSink, Sink, Trailer},
    template::Template,
    transport::Protocol,
};

use backtrace::Backtrace;
use clap::{ArgAction, Parser};
use tracing::warn;

use std::path::PathBuf;

/// Where the record source listens by default
pub const DEFAULT_SOCKET: &str = "/var/run/logship.sock";

/// Ship log records to stdout, a local file or a remote collector.
#[derive(Parser, Debug)]
#[command(name = "logship", version, about, long_about = None, disable_help_flag = true)]
pub struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Record source socket, or `-` to read frames from stdin
    #[arg(short = 's', value_name = "PATH", default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,

    /// Only show the last COUNT historical records
    #[arg(short = 'l', value_name = "COUNT")]
    pub lines: Option<u32>,

    /// Only ship records whose message matches PATTERN
    #[arg(short = 'e', value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Ship records to a remote collector; PORT must be numeric (service names such as `syslog`
    /// aren't looked up)
    #[arg(short = 'r', num_args = 2, value_names = ["HOST", "PORT"])]
    pub remote: Option<Vec<String>>,

    /// Use UDP rather than TCP
    #[arg(short = 'u')]
    pub udp: bool,

    /// Terminate records sent over TCP with NUL rather than newline
    #[arg(short = '0')]
    pub nul: bool,

    /// Ship records to a local file
    #[arg(short = 'F', value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Rotate the log file once it exceeds KB kilobytes
    #[arg(short = 'S', value_name = "KB", allow_negative_numbers = true)]
    pub size: Option<i64>,

    /// Write our PID to FILE (when following)
    #[arg(short = 'p', value_name = "FILE")]
    pub pid_file: Option<PathBuf>,

    /// Hostname to put in records sent to a remote collector
    #[arg(short = 'h', value_name = "HOSTNAME")]
    pub hostname: Option<String>,

    /// Prefix to put in records sent to a remote collector
    #[arg(short = 'P', value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Include the `[seconds.millis]` timestamp
    #[arg(short = 't')]
    pub timestamp: bool,

    /// Render records through TEMPLATE (placeholders: %message%, %priority%, %source%,
    /// %timestamp%, %rfc3339%)
    #[arg(short = 'T', value_name = "TEMPLATE")]
    pub template: Option<String>,

    /// Keep running, shipping new records as they arrive
    #[arg(short = 'f')]
    pub follow: bool,

    /// Render human-readable times in UTC rather than local time
    #[arg(long)]
    pub utc: bool,

    /// Diagnostics filter (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, value_name = "FILTER", default_value = "info")]
    pub log_level: String,
}

/// Where the records come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordSource {
    Socket(PathBuf),
    Stdin,
}

/// Where the records go
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Stdout,
    File {
        path: PathBuf,
        rotate_bytes: Option<u64>,
    },
    Network {
        host: String,
        port: u16,
        protocol: Protocol,
        trailer: Trailer,
    },
}

/// Validated configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub source: RecordSource,
    pub lines: Option<u32>,
    pub follow: bool,
    pub pattern: Option<String>,
    pub template: Option<String>,
    pub output: Output,
    pub pid_file: Option<PathBuf>,
    pub hostname: Option<String>,
    pub prefix: Option<String>,
    pub timestamp: bool,
    pub zone: Zone,
    pub log_level: String,
}

fn config_error(text: String) -> Error {
    Error::Config {
        text,
        back: Backtrace::new(),
    }
}

/// `-S` takes kilobytes; anything below one is taken to be one.
fn rotate_bytes(kb: i64) -> u64 {
    (kb.max(1) as u64).saturating_mul(1024)
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Config> {
        let source = if cli.socket.as_os_str() == "-" {
            RecordSource::Stdin
        } else {
            RecordSource::Socket(cli.socket)
        };

        let output = match (cli.remote, cli.file) {
            (Some(remote), file) => {
                let (host, port) = match remote.as_slice() {
                    [host, port] => (host.clone(), port),
                    _ => return Err(config_error("-r takes a host & a port".to_string())),
                };
                let port = port
                    .parse::<u16>()
                    .map_err(|err| {
                        config_error(format!("bad port {:?} (must be numeric): {}", port, err))
                    })?;
                if let Some(file) = file {
                    warn!(
                        "both a collector & a file were given; ignoring {}",
                        file.display()
                    );
                }
                Output::Network {
                    host,
                    port,
                    protocol: if cli.udp { Protocol::Udp } else { Protocol::Tcp },
                    trailer: if cli.nul { Trailer::Nul } else { Trailer::Newline },
                }
            }
            (None, Some(path)) => Output::File {
                path,
                rotate_bytes: cli.size.map(rotate_bytes),
            },
            (None, None) => Output::Stdout,
        };

        Ok(Config {
            source,
            // A count of zero means "not given"
            lines: cli.lines.filter(|&n| n > 0),
            follow: cli.follow,
            pattern: cli.pattern,
            template: cli.template,
            output,
            pid_file: cli.pid_file,
            hostname: cli.hostname,
            prefix: cli.prefix,
            timestamp: cli.timestamp,
            zone: if cli.utc { Zone::Utc } else { Zone::Local },
            log_level: cli.log_level,
        })
    }
    /// The `lines` member of the read request: the requested count, else zero when following,
    /// else nothing.
    pub fn requested_lines(&self) -> Option<u32> {
        match (self.lines, self.follow) {
            (Some(n), _) => Some(n),
            (None, true) => Some(0),
            (None, false) => None,
        }
    }
    pub fn is_network(&self) -> bool {
        matches!(self.output, Output::Network { .. })
    }
    pub fn filter(&self) -> Filter {
        Filter::from_config(self.pattern.as_deref())
    }
    pub fn renderer(&self) -> Renderer {
        match &self.template {
            Some(text) => {
                let template = Template::parse(text);
                if !template.fits() {
                    warn!(
                        "the template is {} bytes long; every record will be dropped",
                        template.len()
                    );
                }
                // Only line-oriented sinks get a newline
                Renderer::Templated(Templated::new(template, !self.is_network()))
            }
            None if self.is_network() => Renderer::Relay(
                Relay::builder()
                    .timestamp(self.timestamp)
                    .hostname(self.hostname.clone())
                    .prefix(self.prefix.clone())
                    .zone(self.zone)
                    .build(),
            ),
            None => Renderer::Classic(Classic::new(self.timestamp, self.zone)),
        }
    }
    /// Open the sink. For a file, this opens (or creates) the file, which may fail; network sinks
    /// don't connect until their first retry deadline.
    pub fn sink(&self) -> Result<Sink> {
        Ok(match &self.output {
            Output::Stdout => Sink::Stdout,
            Output::File { path, rotate_bytes } => Sink::File(FileSink::open(path, *rotate_bytes)?),
            Output::Network {
                host,
                port,
                protocol,
                trailer,
            } => Sink::Network(NetworkSink::new(host, *port, *protocol, *trailer)),
        })
    }
}
