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

//! Where rendered records end up
//! =============================
//!
//! # Introduction
//!
//! A [`Sink`] is one of:
//!
//! - standard output
//! - a local file, optionally rotated once it grows past a size threshold ([`FileSink`])
//! - a remote collector reached over TCP or UDP ([`NetworkSink`])
//!
//! # Reconnecting
//!
//! A [`NetworkSink`] starts out [`LinkState::Disconnected`] with a connection attempt scheduled
//! [`RETRY_DELAY`] out. Each attempt either leaves it [`LinkState::Connected`] or schedules the
//! next one; a failed write or a peer hang-up tears the link down & schedules a new attempt. There
//! is never more than one attempt pending, and no limit on how many are made.
//!
//! Records written while the link is down are dropped.

use crate::{
    error::{Error, Result},
    transport::{Link, Protocol},
};

use backtrace::Backtrace;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use std::{
    fs::{File, OpenOptions},
    io::Write,
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

/// Delay between a link going down & the next attempt to bring it back up
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// What terminates each record on a TCP link
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Trailer {
    #[default]
    Newline,
    Nul,
}

impl Trailer {
    pub fn byte(&self) -> u8 {
        match self {
            Trailer::Newline => b'\n',
            Trailer::Nul => 0,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           file sink                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .map_err(|err| Error::FileOpen {
            path: path.to_path_buf(),
            source: err,
            back: Backtrace::new(),
        })
}

/// An append-only local log file.
pub struct FileSink {
    path: PathBuf,
    /// Rotate once the file on disk exceeds this many bytes
    threshold: Option<u64>,
    file: File,
}

impl FileSink {
    pub fn open<P: AsRef<Path>>(path: P, threshold: Option<u64>) -> Result<FileSink> {
        let path = path.as_ref().to_path_buf();
        let file = open_log_file(&path)?;
        Ok(FileSink {
            path,
            threshold,
            file,
        })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// `<path>.old`
    pub fn rotated_path(&self) -> PathBuf {
        let mut old = self.path.clone().into_os_string();
        old.push(".old");
        PathBuf::from(old)
    }
    /// If the file has outgrown the threshold, move it aside & start a new one. A file we can't
    /// `stat` is left alone.
    fn rotate_if_needed(&mut self) -> Result<()> {
        let threshold = match self.threshold {
            Some(n) => n,
            None => return Ok(()),
        };
        match std::fs::metadata(&self.path) {
            Ok(md) if md.len() > threshold => (),
            _ => return Ok(()),
        }
        let old = self.rotated_path();
        debug!("Rotating {} to {}", self.path.display(), old.display());
        if let Err(err) = std::fs::rename(&self.path, &old) {
            warn!(
                "failed to rename {} to {}: {}",
                self.path.display(),
                old.display(),
                err
            );
        }
        // Failure here is fatal; the old handle is gone either way.
        self.file = open_log_file(&self.path)?;
        Ok(())
    }
    /// Append `buf`, rotating first if need be, and flush it to disk.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.rotate_if_needed()?;
        self.file.write_all(buf)?;
        self.file.sync_all()?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          network sink                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The state of our connection to the collector
pub enum LinkState {
    /// No connection; the next attempt is due at `retry_at`
    Disconnected { retry_at: Instant },
    /// An attempt is in progress
    Connecting,
    Connected(Link),
}

/// Something that happened to the link while we weren't writing to it
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// The reconnect deadline has arrived
    RetryDue,
    /// The peer closed its end of the connection
    PeerClosed,
}

/// A remote collector.
pub struct NetworkSink {
    host: String,
    port: u16,
    protocol: Protocol,
    trailer: Trailer,
    state: LinkState,
}

impl NetworkSink {
    /// The first connection attempt is made [`RETRY_DELAY`] from now.
    pub fn new(host: &str, port: u16, protocol: Protocol, trailer: Trailer) -> NetworkSink {
        NetworkSink {
            host: host.to_string(),
            port,
            protocol,
            trailer,
            state: LinkState::Disconnected {
                retry_at: Instant::now() + RETRY_DELAY,
            },
        }
    }
    pub fn state(&self) -> &LinkState {
        &self.state
    }
    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected(_))
    }
    /// Apply link-level framing to a rendering.
    ///
    /// Datagrams go out as-is. On a stream each record gets the configured trailer, unless it is a
    /// templated rendering that already ends with the trailer byte.
    pub fn frame(&self, rendered: &[u8], templated: bool) -> Vec<u8> {
        let mut buf = rendered.to_vec();
        if self.protocol == Protocol::Tcp {
            let trailer = self.trailer.byte();
            if !(templated && rendered.last() == Some(&trailer)) {
                buf.push(trailer);
            }
        }
        buf
    }
    fn schedule_retry(&mut self) {
        self.state = LinkState::Disconnected {
            retry_at: Instant::now() + RETRY_DELAY,
        };
    }
    /// Drop the connection (if any) & schedule a reconnect.
    pub fn disconnect(&mut self) {
        // Dropping the `Link` closes the socket
        self.schedule_retry();
    }
    /// Make one connection attempt.
    pub async fn reconnect(&mut self) {
        self.state = LinkState::Connecting;
        match Link::connect(self.protocol, &self.host, self.port).await {
            Ok(link) => {
                info!("connected to {}:{}", self.host, self.port);
                self.state = LinkState::Connected(link);
            }
            Err(err) => {
                warn!("failed to connect: {}", err);
                self.schedule_retry();
            }
        }
    }
    /// Send one framed record. While the link is down the record is silently dropped; if the
    /// send fails, the link is torn down, a reconnect is scheduled & the error returned.
    pub async fn write(&mut self, buf: &[u8]) -> Result<()> {
        let link = match &mut self.state {
            LinkState::Connected(link) => link,
            _ => return Ok(()),
        };
        if let Err(err) = link.send(buf).await {
            warn!(
                "failed to send log data to {}:{} via {}",
                self.host, self.port, self.protocol
            );
            self.disconnect();
            return Err(err);
        }
        Ok(())
    }
    /// Wait for the next thing to happen to the link: the reconnect deadline, or the peer going
    /// away. Cancel-safe.
    pub async fn next_event(&mut self) -> LinkEvent {
        match &mut self.state {
            LinkState::Disconnected { retry_at } => {
                tokio::time::sleep_until(*retry_at).await;
                LinkEvent::RetryDue
            }
            LinkState::Connecting => std::future::pending().await,
            LinkState::Connected(link) => {
                link.closed().await;
                LinkEvent::PeerClosed
            }
        }
    }
    /// React to a [`LinkEvent`].
    pub async fn handle(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::RetryDue => self.reconnect().await,
            LinkEvent::PeerClosed => {
                info!("{}:{} closed the connection", self.host, self.port);
                self.disconnect();
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              Sink                                              //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Wherever rendered records are going
pub enum Sink {
    Stdout,
    File(FileSink),
    Network(NetworkSink),
}

impl Sink {
    /// Deliver one rendering. `templated` says whether it came from an operator template (which
    /// matters to the TCP trailer).
    pub async fn write(&mut self, rendered: &[u8], templated: bool) -> Result<()> {
        match self {
            Sink::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(rendered)?;
                out.flush()?;
                Ok(())
            }
            Sink::File(file) => file.write(rendered),
            Sink::Network(net) => {
                let buf = net.frame(rendered, templated);
                net.write(&buf).await
            }
        }
    }
    /// Wait on the link, if there is one; other sinks have nothing to wait for.
    pub async fn next_event(&mut self) -> LinkEvent {
        match self {
            Sink::Network(net) => net.next_event().await,
            _ => std::future::pending().await,
        }
    }
    pub async fn handle(&mut self, event: LinkEvent) {
        if let Sink::Network(net) = self {
            net.handle(event).await;
        }
    }
}
