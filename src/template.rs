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

//! Operator-supplied output templates
//! ==================================
//!
//! # Introduction
//!
//! A template is free text containing any of five placeholders:
//!
//! | placeholder   | replaced by                                      |
//! |---------------|--------------------------------------------------|
//! | `%message%`   | the message text                                 |
//! | `%priority%`  | the packed priority, in decimal                  |
//! | `%source%`    | `kernel`, `syslog`, `internal` or `-`            |
//! | `%timestamp%` | `[<seconds>.<millis>] `                          |
//! | `%rfc3339%`   | `YYYY-MM-DDThh:mm:ss.mmmZ`                       |
//!
//! The template is broken into [`Segment`]s once, at startup. Placeholders are located
//! left-to-right; the substituted text is never itself searched for placeholders, so a message
//! that happens to contain `%priority%` comes through verbatim.
//!
//! # Capacity
//!
//! Rendering is bounded: neither the template, nor any partially expanded form of it (the
//! expansion so far followed by the still-unexpanded remainder of the template), may exceed
//! [`MAX_RENDERED_LEN`] bytes. Exceeding it fails the render with [`Error::TooLong`]; nothing is
//! ever truncated.

use crate::{
    error::{Error, Result},
    formatter::{rfc3339, short_timestamp},
    record::LogEvent,
};

use backtrace::Backtrace;

/// Size of the render buffer, counting the slot the terminating NUL would occupy on the wire
pub const RENDER_CAPACITY: usize = 512;
/// The longest rendering we'll produce
pub const MAX_RENDERED_LEN: usize = RENDER_CAPACITY - 1;

/// The fields a template may refer to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Placeholder {
    Message,
    Priority,
    Source,
    Timestamp,
    Rfc3339,
}

impl Placeholder {
    /// In tie-break order: when two placeholders start at the same offset, the earlier one wins
    pub const ALL: [Placeholder; 5] = [
        Placeholder::Message,
        Placeholder::Priority,
        Placeholder::Source,
        Placeholder::Timestamp,
        Placeholder::Rfc3339,
    ];
    pub fn token(&self) -> &'static str {
        match self {
            Placeholder::Message => "%message%",
            Placeholder::Priority => "%priority%",
            Placeholder::Source => "%source%",
            Placeholder::Timestamp => "%timestamp%",
            Placeholder::Rfc3339 => "%rfc3339%",
        }
    }
    fn expand(&self, event: &LogEvent) -> String {
        match self {
            Placeholder::Message => event.message.clone(),
            Placeholder::Priority => event.priority.to_string(),
            Placeholder::Source => event.source.name().to_string(),
            Placeholder::Timestamp => short_timestamp(event),
            Placeholder::Rfc3339 => rfc3339(event),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Field(Placeholder),
}

impl Segment {
    /// Length of this segment in the template text
    fn source_len(&self) -> usize {
        match self {
            Segment::Literal(s) => s.len(),
            Segment::Field(p) => p.token().len(),
        }
    }
}

/// A parsed output template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
    // tails[i] is the template text length from segment i onward
    tails: Vec<usize>,
}

/// Find the leftmost placeholder in `text`.
fn leftmost(text: &str) -> Option<(usize, Placeholder)> {
    let mut best: Option<(usize, Placeholder)> = None;
    for p in Placeholder::ALL {
        if let Some(idx) = text.find(p.token()) {
            match best {
                Some((b, _)) if b <= idx => (),
                _ => best = Some((idx, p)),
            }
        }
    }
    best
}

impl Template {
    pub fn parse(text: &str) -> Template {
        let mut segments = Vec::new();
        let mut rest = text;
        while let Some((idx, p)) = leftmost(rest) {
            if idx > 0 {
                segments.push(Segment::Literal(rest[..idx].to_string()));
            }
            segments.push(Segment::Field(p));
            rest = &rest[idx + p.token().len()..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        let mut tails = vec![0; segments.len() + 1];
        for i in (0..segments.len()).rev() {
            tails[i] = tails[i + 1] + segments[i].source_len();
        }
        Template { segments, tails }
    }
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
    /// Length of the template text
    pub fn len(&self) -> usize {
        self.tails[0]
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Whether the template can possibly render, whatever the event
    pub fn fits(&self) -> bool {
        self.len() <= MAX_RENDERED_LEN
    }
    /// Expand this template for `event`.
    pub fn render(&self, event: &LogEvent) -> Result<String> {
        if !self.fits() {
            return Err(Error::TooLong {
                len: self.len(),
                cap: MAX_RENDERED_LEN,
                back: Backtrace::new(),
            });
        }
        let mut out = String::with_capacity(RENDER_CAPACITY);
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(p) => {
                    out.push_str(&p.expand(event));
                    // The expansion so far, plus whatever of the template is left to go
                    let len = out.len() + self.tails[i + 1];
                    if len > MAX_RENDERED_LEN {
                        return Err(Error::TooLong {
                            len,
                            cap: MAX_RENDERED_LEN,
                            back: Backtrace::new(),
                        });
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{facility::Priority, record::Source};

    fn event(message: &str, priority: u32) -> LogEvent {
        LogEvent {
            message: message.to_string(),
            id: 1,
            priority: Priority(priority),
            source: Source::Syslog,
            timestamp_ms: 1_700_000_000_042,
        }
    }

    #[test]
    fn parse() {
        let t = Template::parse("<%priority%> %source%: %message%");
        assert_eq!(
            t.segments(),
            &[
                Segment::Literal("<".to_string()),
                Segment::Field(Placeholder::Priority),
                Segment::Literal("> ".to_string()),
                Segment::Field(Placeholder::Source),
                Segment::Literal(": ".to_string()),
                Segment::Field(Placeholder::Message),
            ]
        );
        assert_eq!(t.len(), 32);

        let t = Template::parse("no placeholders here");
        assert_eq!(
            t.segments(),
            &[Segment::Literal("no placeholders here".to_string())]
        );
        assert!(Template::parse("").is_empty());
    }

    #[test]
    fn substitution() {
        let t = Template::parse("%priority%-%message%");
        assert_eq!(t.render(&event("boot", 5)).unwrap(), "5-boot");

        let t = Template::parse("%rfc3339% %timestamp%%source%");
        assert_eq!(
            t.render(&event("boot", 5)).unwrap(),
            "2023-11-14T22:13:20.042Z [1700000000.042] syslog"
        );

        let t = Template::parse("plain text");
        assert_eq!(t.render(&event("boot", 5)).unwrap(), "plain text");
    }

    #[test]
    fn leftmost_wins() {
        // "%source%" appears before "%message%" even though "%message%" is earlier in the table
        let t = Template::parse("%source%%message%%source%");
        assert_eq!(t.render(&event("m", 5)).unwrap(), "syslogmsyslog");
        // An almost-placeholder is just text
        let t = Template::parse("%messag%priority%");
        assert_eq!(t.render(&event("m", 5)).unwrap(), "%messag5");
    }

    #[test]
    fn no_rescan() {
        let t = Template::parse("%message%|%priority%");
        assert_eq!(
            t.render(&event("%priority% %source%", 3)).unwrap(),
            "%priority% %source%|3"
        );
    }

    #[test]
    fn overflow() {
        // The template alone is too long
        let text = format!("{}%message%", "x".repeat(MAX_RENDERED_LEN));
        let t = Template::parse(&text);
        assert!(!t.fits());
        assert!(matches!(t.render(&event("", 1)), Err(Error::TooLong { .. })));

        // The expansion is too long
        let t = Template::parse("%message%");
        let big = "y".repeat(MAX_RENDERED_LEN + 1);
        match t.render(&event(&big, 1)) {
            Err(Error::TooLong { len, cap, .. }) => {
                assert_eq!(len, MAX_RENDERED_LEN + 1);
                assert_eq!(cap, MAX_RENDERED_LEN);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Exactly at capacity is fine
        let fits = "y".repeat(MAX_RENDERED_LEN);
        assert_eq!(t.render(&event(&fits, 1)).unwrap().len(), MAX_RENDERED_LEN);

        // An intermediate expansion counts the unexpanded remainder of the template
        let text = format!("%message%{}%priority%", "z".repeat(492));
        let t = Template::parse(&text);
        assert!(t.fits());
        // the final rendering would be 12 + 492 + 1 bytes, but after expanding %message% we
        // have 12 + 492 + 10
        let msg = "w".repeat(12);
        assert!(matches!(t.render(&event(&msg, 1)), Err(Error::TooLong { .. })));
        let msg = "w".repeat(9);
        assert_eq!(t.render(&event(&msg, 1)).unwrap().len(), 9 + 492 + 1);
    }
}
