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

//! A stand-in for the record source: listen on a Unix socket & serve synthetic records to each
//! client that connects.
//!
//! ```text
//! mock-source /tmp/logship.sock 20 -f &
//! logship -s /tmp/logship.sock -f -r 127.0.0.1 5514
//! ```
//!
//! Each client gets COUNT records straight away; with `-f`, one more every second after that
//! until it hangs up. The client's read request is consumed but otherwise ignored.

use logship::{
    facility::Priority,
    record::{Decoder, Frame, LogEvent, Source},
};

use std::{
    io::{Read, Write},
    os::unix::net::{UnixListener, UnixStream},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn synthetic(id: u32) -> LogEvent {
    // Cycle through the sources & a handful of priorities
    let (source, priority, message) = match id % 4 {
        0 => (Source::Kernel, 6, format!("eth0: link up ({})", id)),
        1 => (Source::Syslog, 134, format!("dnsmasq[42]: query {}", id)),
        2 => (Source::Syslog, 28, format!("hostapd: wlan0 deauth {}", id)),
        _ => (Source::Internal, 46, format!("logd: record {}", id)),
    };
    LogEvent {
        message,
        id,
        priority: Priority(priority),
        source,
        timestamp_ms: now_ms(),
    }
}

/// Consume the client's read request. It isn't a `LogEvent`, so it decodes as "malformed"; all
/// that matters is that one whole frame arrived.
fn read_request(stream: &mut UnixStream) -> std::io::Result<()> {
    let mut decoder = Decoder::new();
    let mut buf = [0u8; 256];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        decoder.extend(&buf[..n]);
        match decoder.next_frame() {
            Ok(Some(Frame::Malformed)) | Ok(Some(Frame::Event(_))) => return Ok(()),
            Ok(None) => continue,
            Err(err) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    err.to_string(),
                ))
            }
        }
    }
}

fn serve(mut stream: UnixStream, count: u32, follow: bool) -> std::io::Result<()> {
    read_request(&mut stream)?;
    for id in 0..count {
        stream.write_all(&synthetic(id).to_frame())?;
    }
    if follow {
        let mut id = count;
        loop {
            std::thread::sleep(Duration::from_secs(1));
            stream.write_all(&synthetic(id).to_frame())?;
            id += 1;
        }
    }
    Ok(())
}

pub fn main() {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "/tmp/logship.sock".to_string());
    let count = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);
    let follow = args.next().as_deref() == Some("-f");

    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).unwrap();
    eprintln!("serving {} records on {}", count, path);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                std::thread::spawn(move || {
                    if let Err(err) = serve(stream, count, follow) {
                        eprintln!("client went away: {}", err);
                    }
                });
            }
            Err(err) => eprintln!("accept failed: {}", err),
        }
    }
}
