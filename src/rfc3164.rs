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

//! RFC 3164-compliant syslog message formatting for our own diagnostics
//! ====================================================================
//!
//! # Introduction
//!
//! When forwarding records to a remote collector, [logship](crate) reports connection events
//! (and failures) to the _local_ syslog daemon, the way any well-behaved daemon would. Those
//! reports are formatted by [`Rfc3164`] according to RFC [3164] (AKA the BSD syslog protocol):
//!
//! ```text
//! <30>Nov 14 22:13:20 bree logship[1234]: connected to collector:514
//! ```
//!
//! [3164]: https://datatracker.ietf.org/doc/html/rfc3164
//!
//! RFC 3164 is used rather than 5424 because [rsyslog], when listening on `/dev/log`, hands
//! incoming messages to its "special parser", which doesn't understand 5424.
//!
//! [rsyslog]: https://www.rsyslog.com/
//!
//! Note that this has nothing to do with the _records_ we ship: those are rendered by
//! [`crate::formatter`].

use crate::facility::{Facility, Level};

use backtrace::Backtrace;
use bytes::BufMut;
use chrono::prelude::*;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       module error type                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// syslog header errors
#[non_exhaustive]
pub enum Error {
    /// Non-compliant hostname provided
    BadHostname { name: Vec<u8>, back: Backtrace },
    /// Failed to retrieve an IP address in lieu of a hostname
    BadIpAddress {
        source: local_ip_address::Error,
        back: Backtrace,
    },
    /// Non-compliant tag provided
    BadTag { name: Vec<u8>, back: Backtrace },
    /// I/O error
    Io {
        source: std::io::Error,
        back: Backtrace,
    },
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            source: err,
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadHostname { name, .. } => write!(
                f,
                "{:?} is not an RFC3164-compliant hostname",
                String::from_utf8_lossy(name)
            ),
            Error::BadIpAddress { source, .. } => write!(
                f,
                "While attempting to retrieve an IP address for this host, got {}",
                source
            ),
            Error::BadTag { name, .. } => write!(
                f,
                "{:?} is not an RFC3164-compliant tag",
                String::from_utf8_lossy(name)
            ),
            Error::Io { source, .. } => write!(f, "I/O error: {}", source),
            _ => write!(f, "syslog header error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadHostname { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::BadIpAddress { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::BadTag { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Io { back, .. } => write!(f, "{}\n{:#?}", self, back),
            _ => write!(f, "{}", self),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         utility types                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(unix)]
fn bytes_from_os_str(s: std::ffi::OsString) -> Vec<u8> {
    use std::os::unix::ffi::OsStringExt;
    s.into_vec()
}

/// A `Vec<u8>` instance with the additional constraint that its contents be ASCII above the value
/// 32 (space)
pub struct Rfc3164Hostname(Vec<u8>);

impl Rfc3164Hostname {
    /// An RFC 3164-compliant hostname is made-up of ASCII above 32/space. The domain is not
    /// checked for here; [`Rfc3164Hostname::try_default`] strips it.
    pub fn new(bytes: Vec<u8>) -> Result<Rfc3164Hostname> {
        if !bytes.is_empty() && bytes.iter().all(|&x| x > 32 && x < 128) {
            Ok(Rfc3164Hostname(bytes))
        } else {
            Err(Error::BadHostname {
                name: bytes,
                back: Backtrace::new(),
            })
        }
    }
    /// Remove anything including & after the first `.` in `bytes`.
    fn strip_domain(mut bytes: Vec<u8>) -> Vec<u8> {
        if let Some(idx) = bytes.iter().position(|&x| x == b'.') {
            bytes.truncate(idx);
        }
        bytes
    }
    /// Attempt to figure-out an RFC [3164]-compliant hostname: the local hostname, sans domain,
    /// falling back to this host's IP address.
    ///
    /// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
    pub fn try_default() -> Result<Rfc3164Hostname> {
        hostname::get()
            .map_err(|err| err.into())
            .and_then(|hn| {
                Rfc3164Hostname::new(Rfc3164Hostname::strip_domain(bytes_from_os_str(hn)))
            })
            .or_else(|_err| {
                local_ip_address::local_ip()
                    .map(|ip| Rfc3164Hostname(ip.to_string().into_bytes()))
                    .map_err(|err| Error::BadIpAddress {
                        source: err,
                        back: Backtrace::new(),
                    })
            })
    }
}

impl std::convert::TryFrom<String> for Rfc3164Hostname {
    type Error = Error;
    fn try_from(x: String) -> StdResult<Self, Self::Error> {
        Rfc3164Hostname::new(x.into_bytes())
    }
}

/// ASCII alphanumeric, no more than 32 characters
///
/// Per the RFC: "The TAG is a string of ABNF alphanumeric characters that MUST NOT exceed 32
/// characters." The process ID that customarily follows (`TAG[pid]:`) is technically the start of
/// the CONTENT field, so it isn't part of the [`Tag`].
pub struct Tag(Vec<u8>);

impl Tag {
    pub fn new(bytes: Vec<u8>) -> Result<Tag> {
        if !bytes.is_empty() && bytes.len() <= 32 && bytes.iter().all(u8::is_ascii_alphanumeric) {
            Ok(Tag(bytes))
        } else {
            Err(Error::BadTag {
                name: bytes,
                back: Backtrace::new(),
            })
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           formatter                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A syslog formatter that produces RFC [3164]-conformant syslog messages.
///
/// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
///
/// The defaults match what the traditional tool announced itself as: facility `daemon`, the tag
/// `logship` & our PID.
pub struct Rfc3164 {
    facility: Facility,
    hostname: Rfc3164Hostname,
    tag: Tag,
    add_pid: Option<u32>,
}

impl Rfc3164 {
    pub fn try_default() -> Result<Rfc3164> {
        Ok(Rfc3164 {
            facility: Facility::LOG_DAEMON,
            hostname: Rfc3164Hostname::try_default()?,
            tag: Tag::new(b"logship".to_vec())?,
            add_pid: Some(std::process::id()),
        })
    }
    pub fn builder() -> Result<Rfc3164Builder> {
        Ok(Rfc3164Builder {
            imp: Rfc3164::try_default()?,
        })
    }
    /// Format `msg` at `level`; `timestamp` defaults to now.
    pub fn format(&self, level: Level, msg: &str, timestamp: Option<DateTime<Utc>>) -> Vec<u8> {
        let mut buf = format!(
            "<{}>{} ",
            self.facility as u32 | level as u32,
            timestamp
                .map(|d| d.with_timezone(&Local))
                .unwrap_or_else(Local::now)
                .format("%b %_d %H:%M:%S"),
        )
        .into_bytes();

        buf.put_slice(&self.hostname.0);
        buf.put_slice(b" ");
        buf.put_slice(&self.tag.0);
        match self.add_pid {
            Some(pid) => buf.put_slice(format!("[{}]: ", pid).as_bytes()),
            None => buf.put_slice(b": "),
        }
        buf.put_slice(msg.as_bytes());
        buf
    }
}

pub struct Rfc3164Builder {
    imp: Rfc3164,
}

impl Rfc3164Builder {
    pub fn hostname_as_string(mut self, hostname: String) -> Result<Self> {
        self.imp.hostname = Rfc3164Hostname::try_from(hostname)?;
        Ok(self)
    }
    pub fn pid(mut self, pid: Option<u32>) -> Self {
        self.imp.add_pid = pid;
        self
    }
    pub fn build(self) -> Rfc3164 {
        self.imp
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_hostname() {
        let _x = Rfc3164Hostname::try_default(); // At least _exercise_ it

        assert!(Rfc3164Hostname::new("not valid".as_bytes().into()).is_err());
        assert!(Rfc3164Hostname::new(Vec::new()).is_err());

        assert!(
            Rfc3164Hostname::strip_domain("staging.pwpinfra.com".as_bytes().into()) == b"staging"
        );

        let x = Rfc3164Hostname::try_from(String::from("bree"));
        assert!(x.is_ok());
    }

    #[test]
    fn test_tag() {
        assert!(Tag::new(b"logship".to_vec()).is_ok());
        // 33 chars-- no go
        assert!(Tag::new(b"012345678901234567890123456789012".to_vec()).is_err());
        // Non-ASCII-- no go
        assert!(Tag::new("日志".as_bytes().to_vec()).is_err());
        assert!(Tag::new(b"log-ship".to_vec()).is_err());
    }

    #[test]
    fn test_format() {
        let f = Rfc3164::builder()
            .unwrap()
            .hostname_as_string("bree".to_string())
            .unwrap()
            .pid(Some(123))
            .build();

        let ts = Local.with_ymd_and_hms(2023, 11, 4, 22, 13, 20).unwrap();
        let out = f.format(
            Level::LOG_INFO,
            "connected to collector:514",
            Some(ts.with_timezone(&Utc)),
        );
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "<30>Nov  4 22:13:20 bree logship[123]: connected to collector:514"
        );

        let f = Rfc3164::builder()
            .unwrap()
            .hostname_as_string("bree".to_string())
            .unwrap()
            .pid(None)
            .build();
        let out = f.format(Level::LOG_ERR, "oops", Some(ts.with_timezone(&Utc)));
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "<27>Nov  4 22:13:20 bree logship: oops"
        );
    }
}
