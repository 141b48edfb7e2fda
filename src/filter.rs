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

//! Message filtering.

use crate::error::{Error, Result};

use backtrace::Backtrace;
use regex::Regex;
use tracing::warn;

/// Accept or reject records by testing their message text against a regular expression.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pattern: Option<Regex>,
}

impl Filter {
    /// A filter that lets everything through
    pub fn accept_all() -> Filter {
        Filter { pattern: None }
    }
    /// Compile `pattern`; fails if it doesn't compile.
    pub fn new(pattern: &str) -> Result<Filter> {
        Regex::new(pattern)
            .map(|re| Filter { pattern: Some(re) })
            .map_err(|err| Error::BadPattern {
                pattern: pattern.to_string(),
                source: err,
                back: Backtrace::new(),
            })
    }
    /// Build the filter from the (optional) configured pattern.
    ///
    /// A pattern that won't compile is reported and then ignored: the resulting filter accepts
    /// everything.
    pub fn from_config(pattern: Option<&str>) -> Filter {
        match pattern.map(Filter::new) {
            Some(Ok(filter)) => filter,
            Some(Err(err)) => {
                warn!("{}; not filtering", err);
                Filter::accept_all()
            }
            None => Filter::accept_all(),
        }
    }
    pub fn is_active(&self) -> bool {
        self.pattern.is_some()
    }
    pub fn accepts(&self, message: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|re| re.is_match(message))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_pattern() {
        let f = Filter::from_config(None);
        assert!(!f.is_active());
        assert!(f.accepts(""));
        assert!(f.accepts("anything at all"));
    }

    #[test]
    fn matching() {
        let f = Filter::new("^(kernel|dnsmasq)").unwrap();
        assert!(f.accepts("dnsmasq[123]: query"));
        assert!(!f.accepts("hostapd: wlan0 up"));
        // Unanchored match anywhere in the message
        let f = Filter::new("wlan[0-9]").unwrap();
        assert!(f.accepts("hostapd: wlan0 up"));
    }

    #[test]
    fn bad_pattern_accepts_all() {
        assert!(Filter::new("(unclosed").is_err());
        let f = Filter::from_config(Some("(unclosed"));
        assert!(!f.is_active());
        assert!(f.accepts("(unclosed"));
        assert!(f.accepts("something else"));
    }

    #[test]
    fn order_independent() {
        let f = Filter::new("up$").unwrap();
        let msgs = ["link up", "link down", "eth0 up", "bridge"];
        let first: Vec<bool> = msgs.iter().map(|m| f.accepts(m)).collect();
        let reversed: Vec<bool> = msgs.iter().rev().map(|m| f.accepts(m)).collect();
        assert_eq!(
            first,
            reversed.into_iter().rev().collect::<Vec<bool>>()
        );
        assert_eq!(first, vec![true, false, true, false]);
    }
}
