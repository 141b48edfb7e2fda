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

//! [logship](crate) errors

use backtrace::Backtrace;

use std::path::PathBuf;

/// [logship](crate) error type
///
/// [logship](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of a
/// straightforward enumeration with a few match arms chosen on the basis what the caller will need
/// to respond. The delivery loop in particular only needs to know whether a failure is fatal
/// (see [`Error::is_fatal`]) or can be absorbed by dropping the record at hand.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A frame header declared a length shorter than the header itself; the stream can't be
    /// re-synchronized
    BadFrame { raw_len: usize, back: Backtrace },
    /// The filter pattern failed to compile
    BadPattern {
        pattern: String,
        source: regex::Error,
        back: Backtrace,
    },
    /// Invalid command-line configuration
    Config { text: String, back: Backtrace },
    /// The configured log file could not be opened (or re-opened after rotation)
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
        back: Backtrace,
    },
    /// General I/O error
    Io {
        source: std::io::Error,
        back: Backtrace,
    },
    /// Failed to install the diagnostics subscriber
    Logging {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// The record source could not be reached within the retry budget
    NoRecordSource {
        path: PathBuf,
        tries: usize,
        source: std::io::Error,
        back: Backtrace,
    },
    /// A rendered record would exceed the render buffer
    TooLong {
        len: usize,
        cap: usize,
        back: Backtrace,
    },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl Error {
    /// Fatal errors terminate the delivery loop; everything else costs at most one record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::BadFrame { .. }
                | Error::Config { .. }
                | Error::FileOpen { .. }
                | Error::NoRecordSource { .. }
        )
    }
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
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadFrame { raw_len, .. } => write!(
                f,
                "Frame header declares {} bytes, less than the header itself",
                raw_len
            ),
            Error::BadPattern {
                pattern, source, ..
            } => write!(f, "Failed to compile filter {:?}: {}", pattern, source),
            Error::Config { text, .. } => write!(f, "Bad configuration: {}", text),
            Error::FileOpen { path, source, .. } => {
                write!(f, "failed to open {}: {}", path.display(), source)
            }
            Error::Io { source, .. } => write!(f, "I/O error: {}", source),
            Error::Logging { source, .. } => {
                write!(f, "Failed to set up diagnostics: {}", source)
            }
            Error::NoRecordSource {
                path,
                tries,
                source,
                ..
            } => write!(
                f,
                "Failed to reach the record source at {} after {} attempts: {}",
                path.display(),
                tries,
                source
            ),
            Error::TooLong { len, cap, .. } => write!(
                f,
                "size of log ({} bytes) is larger than the internal buffer ({} bytes)",
                len, cap
            ),
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            _ => write!(f, "Other logship error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadFrame { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::BadPattern { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::FileOpen { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Io { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::NoRecordSource { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:#?}", self, back),
            err => write!(f, "logship error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    #[allow(unreachable_patterns)]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BadPattern { source, .. } => Some(source),
            Error::FileOpen { source, .. } => Some(source),
            Error::Io { source, .. } => Some(source),
            Error::NoRecordSource { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fatal_classification() {
        let err = Error::TooLong {
            len: 600,
            cap: 511,
            back: Backtrace::new(),
        };
        assert!(!err.is_fatal());
        assert_eq!(
            format!("{}", err),
            "size of log (600 bytes) is larger than the internal buffer (511 bytes)"
        );

        let err = Error::FileOpen {
            path: PathBuf::from("/nonexistent/messages"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
            back: Backtrace::new(),
        };
        assert!(err.is_fatal());

        let err: Error = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(!err.is_fatal());
    }
}
