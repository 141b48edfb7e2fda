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

//! A [`tracing-subscriber`] [`Layer`] that copies our diagnostics to the local syslog daemon
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! Each [`Event`]'s "message" field is formatted by [`Rfc3164`] and handed to a [`Transport`]
//! (in production, the `/dev/log` [`UnixSocket`]). Spans are ignored.
//!
//! [`Event`]: https://docs.rs/tracing/latest/tracing/struct.Event.html

use crate::{
    facility::Level,
    rfc3164::{self, Rfc3164},
    transport::{Transport, UnixSocket},
};

use backtrace::Backtrace;
use tracing::Event;
use tracing_core::field::{Field, Visit};
use tracing_subscriber::layer::Context;

type StdResult<T, E> = std::result::Result<T, E>;

#[non_exhaustive]
pub enum Error {
    /// The syslog header couldn't be set up
    Header {
        source: rfc3164::Error,
        back: Backtrace,
    },
    /// No message field found in the event
    NoMessageField { name: &'static str, back: Backtrace },
    /// The local syslog daemon isn't listening
    Transport {
        source: crate::error::Error,
        back: Backtrace,
    },
}

impl std::fmt::Display for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Header { source, .. } => write!(f, "Failed to build a syslog header: {}", source),
            Error::NoMessageField { name, .. } => {
                write!(f, "No message field found in event {}", name)
            }
            Error::Transport { source, .. } => {
                write!(f, "Failed to reach the local syslog daemon: {}", source)
            }
            _ => write!(f, "diagnostic layer error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Header { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::NoMessageField { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:#?}", self, back),
            _ => write!(f, "{}", self),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = StdResult<T, Error>;

fn default_level_mapping(level: &tracing_core::Level) -> Level {
    match *level {
        tracing_core::Level::TRACE | tracing_core::Level::DEBUG => Level::LOG_DEBUG,
        tracing_core::Level::INFO => Level::LOG_INFO,
        tracing_core::Level::WARN => Level::LOG_WARNING,
        tracing_core::Level::ERROR => Level::LOG_ERR,
    }
}

struct MessageEventVisitor {
    message: Option<String>,
}

impl Visit for MessageEventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            // The tracing macros "pre-format" the `message` field, so `value` is really a
            // `std::fmt::Arguments` & prints without enclosing double-quotes.
            self.message = Some(format!("{:?}", value));
        }
    }
}

fn message_of(event: &Event<'_>) -> Result<String> {
    let mut visitor = MessageEventVisitor { message: None };
    event.record(&mut visitor);
    visitor.message.ok_or_else(|| Error::NoMessageField {
        name: event.metadata().name(),
        back: Backtrace::new(),
    })
}

pub struct Layer<T: Transport> {
    formatter: Rfc3164,
    map_level: Box<dyn Fn(&tracing_core::Level) -> Level + Send + Sync>,
    transport: T,
}

impl Layer<UnixSocket> {
    /// Send to `/dev/log`, with the default header (`daemon`, `logship[pid]`)
    pub fn try_default() -> Result<Self> {
        let transport = UnixSocket::try_default().map_err(|err| Error::Transport {
            source: err,
            back: Backtrace::new(),
        })?;
        Layer::with_transport(transport)
    }
}

impl<T: Transport> Layer<T> {
    pub fn with_transport(transport: T) -> Result<Layer<T>> {
        let formatter = Rfc3164::try_default().map_err(|err| Error::Header {
            source: err,
            back: Backtrace::new(),
        })?;
        Ok(Layer::with_formatter(formatter, transport))
    }
    pub fn with_formatter(formatter: Rfc3164, transport: T) -> Layer<T> {
        Layer {
            formatter,
            map_level: Box::new(default_level_mapping),
            transport,
        }
    }
}

impl<S, T> tracing_subscriber::layer::Layer<S> for Layer<T>
where
    S: tracing::Subscriber,
    T: Transport + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // Nowhere to report a failure to report, short of recursing; drop it.
        if let Ok(msg) = message_of(event) {
            let buf = self
                .formatter
                .format((self.map_level)(event.metadata().level()), &msg, None);
            let _ = self.transport.send(&buf);
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use std::sync::{Arc, Mutex};
    use tracing::{debug, info, warn};
    use tracing_subscriber::{
        layer::SubscriberExt, // Needed to get `with()`
        registry::Registry,
    };

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<String>>>);

    impl Transport for Capture {
        fn send(&self, buf: &[u8]) -> crate::error::Result<usize> {
            self.0
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(buf).to_string());
            Ok(buf.len())
        }
    }

    #[test]
    fn forwards_events() {
        let sent = Capture::default();
        let formatter = Rfc3164::builder()
            .unwrap()
            .hostname_as_string("bree".to_string())
            .unwrap()
            .pid(Some(99))
            .build();
        let subscriber = Registry::default().with(Layer::with_formatter(formatter, sent.clone()));

        tracing::subscriber::with_default(subscriber, || {
            info!("connected to {}:{}", "collector", 514);
            warn!("failed to send log data to {}:{}", "collector", 514);
            debug!("chatter");
        });

        let sent = sent.0.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].starts_with("<30>"));
        assert!(sent[0].ends_with(" bree logship[99]: connected to collector:514"));
        assert!(sent[1].starts_with("<28>"));
        assert!(sent[1].ends_with("logship[99]: failed to send log data to collector:514"));
        assert!(sent[2].starts_with("<31>"));
    }

    #[test]
    fn level_mapping() {
        assert_eq!(default_level_mapping(&tracing_core::Level::TRACE), Level::LOG_DEBUG);
        assert_eq!(default_level_mapping(&tracing_core::Level::DEBUG), Level::LOG_DEBUG);
        assert_eq!(default_level_mapping(&tracing_core::Level::INFO), Level::LOG_INFO);
        assert_eq!(default_level_mapping(&tracing_core::Level::WARN), Level::LOG_WARNING);
        assert_eq!(default_level_mapping(&tracing_core::Level::ERROR), Level::LOG_ERR);
    }

    #[test]
    #[cfg(feature = "syslogd")]
    fn live_dev_log() {
        let subscriber = Registry::default().with(Layer::try_default().unwrap());
        let _guard = tracing::subscriber::set_default(subscriber);
        info!("Hello, 世界!");
    }
}
