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

//! Rendering records for output.
//!
//! This module defines the [`RecordFormatter`] trait along with its three implementations:
//!
//! - [`Classic`]: the traditional `logread` line for stdout & files
//! - [`Relay`]: a BSD-style syslog packet for forwarding over the network
//! - [`Templated`]: an operator-supplied [`Template`]
//!
//! along with [`Renderer`], which picks one of them at startup.

use crate::{
    error::Result,
    record::{LogEvent, Source},
    template::{Template, MAX_RENDERED_LEN},
};

use bytes::BufMut;
use chrono::prelude::*;
use chrono::SecondsFormat;
use tracing::warn;

use std::ops::Deref;

/// `ctime(3)`, less the trailing newline
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";
/// `ctime(3)` less the weekday & year; what RFC 3164 calls TIMESTAMP
const RELAY_FORMAT: &str = "%b %e %H:%M:%S ";

/// Time zone in which human-readable timestamps are rendered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Zone {
    #[default]
    Local,
    Utc,
}

/// Out-of-range timestamps are rendered as the epoch.
fn utc(event: &LogEvent) -> DateTime<Utc> {
    match DateTime::from_timestamp(event.seconds(), event.millis() * 1_000_000) {
        Some(t) => t,
        None => {
            warn!(
                "record {} has an unrepresentable timestamp ({} ms); using the epoch",
                event.id, event.timestamp_ms
            );
            DateTime::<Utc>::default()
        }
    }
}

fn zoned(event: &LogEvent, fmt: &str, zone: Zone) -> String {
    let t = utc(event);
    match zone {
        Zone::Local => t.with_timezone(&Local).format(fmt).to_string(),
        Zone::Utc => t.format(fmt).to_string(),
    }
}

/// `Tue Nov 14 22:13:20 2023`, for the event's whole-second timestamp
pub fn ctime(event: &LogEvent, zone: Zone) -> String {
    zoned(event, CTIME_FORMAT, zone)
}

/// `[1700000000.042] ` (note the trailing space)
pub fn short_timestamp(event: &LogEvent) -> String {
    format!("[{}.{:03}] ", event.seconds(), event.millis())
}

/// `2023-11-14T22:13:20.042Z`
pub fn rfc3339(event: &LogEvent) -> String {
    utc(event).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Operations all record formatters must support
///
/// The associated type `Output` is there to keep callers honest: what gets handed to a sink
/// should have come out of a [`RecordFormatter`], not been cobbled together elsewhere.
pub trait RecordFormatter {
    type Output: Deref<Target = [u8]>;
    fn format(&self, event: &LogEvent) -> Result<Self::Output>;
}

/// The default line for stdout & file sinks:
///
/// ```text
/// Tue Nov 14 22:13:20 2023 [1700000000.042] local0.info link up
/// ```
#[derive(Clone, Debug, Default)]
pub struct Classic {
    timestamp: bool,
    zone: Zone,
}

impl Classic {
    pub fn new(timestamp: bool, zone: Zone) -> Classic {
        Classic { timestamp, zone }
    }
}

impl RecordFormatter for Classic {
    type Output = Vec<u8>;
    fn format(&self, event: &LogEvent) -> Result<Vec<u8>> {
        Ok(format!(
            "{} {}{}.{}{} {}\n",
            ctime(event, self.zone),
            if self.timestamp {
                short_timestamp(event)
            } else {
                String::new()
            },
            event.priority.facility_name(),
            event.priority.level_name(),
            // Keyed off the raw source being zero, not off `Source::Kernel`; see `Relay`.
            if event.source.raw() != 0 {
                ""
            } else {
                " kernel:"
            },
            event.message
        )
        .into_bytes())
    }
}

/// The default packet for network sinks:
///
/// ```text
/// <134>Nov 14 22:13:20 [1700000000.042] gateway logship: kernel: link up
/// ```
///
/// Everything after the timestamp is optional. No trailer is appended; that's up to the sink.
#[derive(Clone, Debug, Default)]
pub struct Relay {
    timestamp: bool,
    hostname: Option<String>,
    prefix: Option<String>,
    zone: Zone,
}

pub struct RelayBuilder {
    imp: Relay,
}

impl RelayBuilder {
    pub fn timestamp(mut self, timestamp: bool) -> Self {
        self.imp.timestamp = timestamp;
        self
    }
    pub fn hostname(mut self, hostname: Option<String>) -> Self {
        self.imp.hostname = hostname;
        self
    }
    pub fn prefix(mut self, prefix: Option<String>) -> Self {
        self.imp.prefix = prefix;
        self
    }
    pub fn zone(mut self, zone: Zone) -> Self {
        self.imp.zone = zone;
        self
    }
    pub fn build(self) -> Relay {
        self.imp
    }
}

impl Relay {
    pub fn builder() -> RelayBuilder {
        RelayBuilder {
            imp: Relay::default(),
        }
    }
}

impl RecordFormatter for Relay {
    type Output = Vec<u8>;
    fn format(&self, event: &LogEvent) -> Result<Vec<u8>> {
        let mut buf = format!(
            "<{}>{}",
            event.priority,
            zoned(event, RELAY_FORMAT, self.zone)
        )
        .into_bytes();

        if self.timestamp {
            buf.put_slice(short_timestamp(event).as_bytes());
        }
        if let Some(hostname) = &self.hostname {
            buf.put_slice(hostname.as_bytes());
            buf.put_u8(b' ');
        }
        if let Some(prefix) = &self.prefix {
            buf.put_slice(prefix.as_bytes());
            buf.put_slice(b": ");
        }
        // Unlike `Classic`, this tests for the kernel source proper.
        if event.source == Source::Kernel {
            buf.put_slice(b"kernel: ");
        }
        buf.put_slice(event.message.as_bytes());
        Ok(buf)
    }
}

/// Render through an operator-supplied [`Template`], optionally terminating the line.
#[derive(Clone, Debug)]
pub struct Templated {
    template: Template,
    newline: bool,
}

impl Templated {
    pub fn new(template: Template, newline: bool) -> Templated {
        Templated { template, newline }
    }
}

impl RecordFormatter for Templated {
    type Output = Vec<u8>;
    fn format(&self, event: &LogEvent) -> Result<Vec<u8>> {
        let mut text = self.template.render(event)?;
        // A full-size rendering goes out as-is, without the newline.
        if self.newline && text.len() < MAX_RENDERED_LEN {
            text.push('\n');
        }
        Ok(text.into_bytes())
    }
}

/// The formatter in use, chosen once at startup from the configuration & the kind of sink.
#[derive(Clone, Debug)]
pub enum Renderer {
    Classic(Classic),
    Relay(Relay),
    Templated(Templated),
}

impl Renderer {
    /// Does this renderer produce text that a TCP sink should leave unterminated?
    pub fn is_templated(&self) -> bool {
        matches!(self, Renderer::Templated(_))
    }
}

impl RecordFormatter for Renderer {
    type Output = Vec<u8>;
    fn format(&self, event: &LogEvent) -> Result<Vec<u8>> {
        match self {
            Renderer::Classic(f) => f.format(event),
            Renderer::Relay(f) => f.format(event),
            Renderer::Templated(f) => f.format(event),
        }
    }
}
