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

//! Ship structured log records to standard output, a rotated local file, or a remote [`syslog`]
//! collector.
//!
//! [`syslog`]: https://en.wikipedia.org/wiki/Syslog
//!
//! # Introduction
//!
//! On small systems the log daemon usually keeps its records in a ring buffer in memory, and
//! hands them out to clients over a local socket as a stream of length-framed, typed tables
//! (message, id, priority, source & timestamp). [logship](crate) is such a client: it asks for
//! the stream, optionally filters it, renders each record as text and writes that text somewhere
//! useful. When that "somewhere" is a remote collector, it keeps the connection alive across
//! failures, reconnecting on a fixed one-second schedule for as long as it runs.
//!
//! # Pieces
//!
//! Leaf-first:
//!
//! - [`record`]: decodes the framed stream into [`record::LogEvent`]s
//! - [`filter`]: accepts or rejects events by regular expression
//! - [`formatter`] & [`template`]: render events, either in one of the traditional line formats or
//!   through an operator-supplied template; [`facility`] supplies the priority names
//! - [`sink`] & [`transport`]: stdout, a size-rotated file, or a TCP/UDP collector
//! - [`pipeline`]: the single-threaded delivery loop that drives all of the above
//! - [`config`]: the command line
//! - [`logging`], [`layer`] & [`rfc3164`]: our own diagnostics, on stderr and (when shipping
//!   to a collector) copied to the local syslog daemon
//!
//! # Usage
//!
//! The binary is the usual way in:
//!
//! ```text
//! logship -f -r collector.example.com 514 -h gateway -P edge
//! ```
//!
//! but the pieces compose on their own, too:
//!
//! ```rust
//! use logship::{
//!     facility::Priority,
//!     formatter::{Classic, RecordFormatter, Zone},
//!     record::{Decoder, Frame, LogEvent, Source},
//! };
//!
//! let event = LogEvent {
//!     message: "link up".to_string(),
//!     id: 1,
//!     priority: Priority(134),
//!     source: Source::Syslog,
//!     timestamp_ms: 1_700_000_000_000,
//! };
//!
//! let mut decoder = Decoder::new();
//! decoder.extend(&event.to_frame());
//! let decoded = match decoder.next_frame().unwrap() {
//!     Some(Frame::Event(event)) => event,
//!     other => panic!("unexpected {:?}", other),
//! };
//!
//! let line = Classic::new(false, Zone::Utc).format(&decoded).unwrap();
//! assert_eq!(line, b"Tue Nov 14 22:13:20 2023 local0.info link up\n");
//! ```

pub mod config;
pub mod error;
pub mod facility;
pub mod filter;
pub mod formatter;
pub mod layer;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod rfc3164;
pub mod sink;
pub mod template;
pub mod transport;
