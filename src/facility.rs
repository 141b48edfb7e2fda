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

//! syslog facility & level defintions.
//!
//! [`Facility`] and [`Level`] replicate the names used in `<syslog.h>`. Records arrive carrying a
//! packed [`Priority`] (facility × 8 + level); the default line format spells both halves out
//! using the short names from the `facilitynames` & `prioritynames` tables in that same header
//! (`daemon.info`, `kern.warn` and so on).

type StdResult<T, E> = std::result::Result<T, E>;

/// Both RFCs [5424] & [3164] define twenty-four "facilities" for messages. The enumeration values
/// duplicate the constants defined in `<syslog.h>`, albeit multiplied by 8 for convenience in
/// forming syslog message headers (which again mirrors the `#define`s in `<syslog.h>`).
///
/// [5424]: https://datatracker.ietf.org/doc/html/rfc5424
/// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
///
/// `<syslog.h>` additionally defines the internal "mark" facility (24), which syslog daemons use
/// for their periodic "-- MARK --" lines; it shows up on the wire often enough that we model it.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Facility {
    /// kernel messages
    LOG_KERN = 0 << 3,
    /// random user-level messages
    LOG_USER = 1 << 3,
    /// mail system
    LOG_MAIL = 2 << 3,
    /// system daemons
    LOG_DAEMON = 3 << 3,
    /// security/authorization messages
    LOG_AUTH = 4 << 3,
    /// messages generated internally by syslogd
    LOG_SYSLOG = 5 << 3,
    /// line printer subsystem
    LOG_LPR = 6 << 3,
    /// network news subsystem
    LOG_NEWS = 7 << 3,
    /// UUCP subsystem
    LOG_UUCP = 8 << 3,
    /// clock daemon
    LOG_CRON = 9 << 3,
    /// security/authorization messages (private)
    LOG_AUTHPRIV = 10 << 3,
    /// ftp daemon
    LOG_FTP = 11 << 3,
    /// NTP subsystem
    LOG_NTP = 12 << 3,
    /// log audit
    LOG_AUDIT = 13 << 3,
    /// log alert
    LOG_ALERT = 14 << 3,
    /// clock daemon (the other one)
    LOG_CLOCK = 15 << 3,
    /// reserved for local use
    LOG_LOCAL0 = 16 << 3,
    /// reserved for local use
    LOG_LOCAL1 = 17 << 3,
    /// reserved for local use
    LOG_LOCAL2 = 18 << 3,
    /// reserved for local use
    LOG_LOCAL3 = 19 << 3,
    /// reserved for local use
    LOG_LOCAL4 = 20 << 3,
    /// reserved for local use
    LOG_LOCAL5 = 21 << 3,
    /// reserved for local use
    LOG_LOCAL6 = 22 << 3,
    /// reserved for local use
    LOG_LOCAL7 = 23 << 3,
    /// mark "facility"
    INTERNAL_MARK = 24 << 3,
}

impl std::default::Default for Facility {
    /// The default facility is `LOG_USER`.
    fn default() -> Self {
        Facility::LOG_USER
    }
}

impl Facility {
    /// Map a facility code (already shifted left by three) to a [`Facility`].
    pub fn from_code(code: u32) -> Option<Facility> {
        Some(match code >> 3 {
            0 => Facility::LOG_KERN,
            1 => Facility::LOG_USER,
            2 => Facility::LOG_MAIL,
            3 => Facility::LOG_DAEMON,
            4 => Facility::LOG_AUTH,
            5 => Facility::LOG_SYSLOG,
            6 => Facility::LOG_LPR,
            7 => Facility::LOG_NEWS,
            8 => Facility::LOG_UUCP,
            9 => Facility::LOG_CRON,
            10 => Facility::LOG_AUTHPRIV,
            11 => Facility::LOG_FTP,
            12 => Facility::LOG_NTP,
            13 => Facility::LOG_AUDIT,
            14 => Facility::LOG_ALERT,
            15 => Facility::LOG_CLOCK,
            16 => Facility::LOG_LOCAL0,
            17 => Facility::LOG_LOCAL1,
            18 => Facility::LOG_LOCAL2,
            19 => Facility::LOG_LOCAL3,
            20 => Facility::LOG_LOCAL4,
            21 => Facility::LOG_LOCAL5,
            22 => Facility::LOG_LOCAL6,
            23 => Facility::LOG_LOCAL7,
            24 => Facility::INTERNAL_MARK,
            _ => return None,
        })
    }
    /// The name `<syslog.h>`'s `facilitynames` table gives this facility, if any.
    ///
    /// The table predates NTP, audit & friends, so those have no name.
    pub fn code_name(&self) -> Option<&'static str> {
        match self {
            Facility::LOG_KERN => Some("kern"),
            Facility::LOG_USER => Some("user"),
            Facility::LOG_MAIL => Some("mail"),
            Facility::LOG_DAEMON => Some("daemon"),
            // "security" is a deprecated alias that comes later in the table
            Facility::LOG_AUTH => Some("auth"),
            Facility::LOG_SYSLOG => Some("syslog"),
            Facility::LOG_LPR => Some("lpr"),
            Facility::LOG_NEWS => Some("news"),
            Facility::LOG_UUCP => Some("uucp"),
            Facility::LOG_CRON => Some("cron"),
            Facility::LOG_AUTHPRIV => Some("authpriv"),
            Facility::LOG_FTP => Some("ftp"),
            Facility::LOG_NTP | Facility::LOG_AUDIT | Facility::LOG_ALERT | Facility::LOG_CLOCK => {
                None
            }
            Facility::LOG_LOCAL0 => Some("local0"),
            Facility::LOG_LOCAL1 => Some("local1"),
            Facility::LOG_LOCAL2 => Some("local2"),
            Facility::LOG_LOCAL3 => Some("local3"),
            Facility::LOG_LOCAL4 => Some("local4"),
            Facility::LOG_LOCAL5 => Some("local5"),
            Facility::LOG_LOCAL6 => Some("local6"),
            Facility::LOG_LOCAL7 => Some("local7"),
            Facility::INTERNAL_MARK => Some("mark"),
        }
    }
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Facility::LOG_KERN => "LOG_KERN",
                Facility::LOG_USER => "LOG_USER",
                Facility::LOG_MAIL => "LOG_MAIL",
                Facility::LOG_DAEMON => "LOG_DAEMON",
                Facility::LOG_AUTH => "LOG_AUTH",
                Facility::LOG_SYSLOG => "LOG_SYSLOG",
                Facility::LOG_LPR => "LOG_LPR",
                Facility::LOG_NEWS => "LOG_NEWS",
                Facility::LOG_UUCP => "LOG_UUCP",
                Facility::LOG_CRON => "LOG_CRON",
                Facility::LOG_AUTHPRIV => "LOG_AUTHPRIV",
                Facility::LOG_FTP => "LOG_FTP",
                Facility::LOG_NTP => "LOG_NTP",
                Facility::LOG_AUDIT => "LOG_AUDIT",
                Facility::LOG_ALERT => "LOG_ALERT",
                Facility::LOG_CLOCK => "LOG_CLOCK",
                Facility::LOG_LOCAL0 => "LOG_LOCAL0",
                Facility::LOG_LOCAL1 => "LOG_LOCAL1",
                Facility::LOG_LOCAL2 => "LOG_LOCAL2",
                Facility::LOG_LOCAL3 => "LOG_LOCAL3",
                Facility::LOG_LOCAL4 => "LOG_LOCAL4",
                Facility::LOG_LOCAL5 => "LOG_LOCAL5",
                Facility::LOG_LOCAL6 => "LOG_LOCAL6",
                Facility::LOG_LOCAL7 => "LOG_LOCAL7",
                Facility::INTERNAL_MARK => "INTERNAL_MARK",
            }
        )
    }
}

/// Both RFCs [5424] & [3164] define eight severity levels for messages. The enumeration values
/// duplicate the constants documented as per the `syslog()` manual [page] & defined in
/// `<syslog.h>`.
///
/// [5424]: https://datatracker.ietf.org/doc/html/rfc5424
/// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    /// system is unusable
    LOG_EMERG,
    /// action must be take immediately
    LOG_ALERT,
    /// critical conditions
    LOG_CRIT,
    /// error conditions
    LOG_ERR,
    /// warning conditions
    LOG_WARNING,
    /// normal, but significant condition
    LOG_NOTICE,
    /// informational message
    LOG_INFO,
    /// debug-level message
    LOG_DEBUG,
}

impl Level {
    /// The name `<syslog.h>`'s `prioritynames` table gives this level.
    ///
    /// That table is searched front-to-back & lists a few aliases ("error", "panic",
    /// "warning"); the first hit wins, which is why `LOG_WARNING` comes out as "warn".
    pub fn code_name(&self) -> &'static str {
        match self {
            Level::LOG_EMERG => "emerg",
            Level::LOG_ALERT => "alert",
            Level::LOG_CRIT => "crit",
            Level::LOG_ERR => "err",
            Level::LOG_WARNING => "warn",
            Level::LOG_NOTICE => "notice",
            Level::LOG_INFO => "info",
            Level::LOG_DEBUG => "debug",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::LOG_EMERG => "LOG_EMERG",
                Level::LOG_ALERT => "LOG_ALERT",
                Level::LOG_CRIT => "LOG_CRIT",
                Level::LOG_ERR => "LOG_ERR",
                Level::LOG_WARNING => "LOG_WARNING",
                Level::LOG_NOTICE => "LOG_NOTICE",
                Level::LOG_INFO => "LOG_INFO",
                Level::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

/// Text used in place of a facility or level name that `<syslog.h>` doesn't know.
pub const UNKNOWN_CODE: &str = "<unknown>";

const LOG_FACMASK: u32 = 0x03f8;
const LOG_PRIMASK: u32 = 0x07;

/// A packed syslog priority, as carried by incoming records.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Priority(pub u32);

impl Priority {
    pub fn facility(&self) -> Option<Facility> {
        Facility::from_code(self.0 & LOG_FACMASK)
    }
    pub fn level(&self) -> Level {
        match self.0 & LOG_PRIMASK {
            0 => Level::LOG_EMERG,
            1 => Level::LOG_ALERT,
            2 => Level::LOG_CRIT,
            3 => Level::LOG_ERR,
            4 => Level::LOG_WARNING,
            5 => Level::LOG_NOTICE,
            6 => Level::LOG_INFO,
            _ => Level::LOG_DEBUG,
        }
    }
    /// Facility name for the default line format; `<unknown>` if there is none
    pub fn facility_name(&self) -> &'static str {
        self.facility()
            .and_then(|f| f.code_name())
            .unwrap_or(UNKNOWN_CODE)
    }
    pub fn level_name(&self) -> &'static str {
        self.level().code_name()
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(f, "{}", self.0)
    }
}
