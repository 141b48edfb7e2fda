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

//! Diagnostics setup.
//!
//! Our own diagnostics always go to stderr (stdout may well be the sink). When shipping to a
//! remote collector, connection events are also copied to the local syslog daemon via
//! [`crate::layer::Layer`].

use crate::{
    error::{Error, Result},
    layer::Layer,
};

use backtrace::Backtrace;
use tracing::warn;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    Layer as SubscriberLayer,
};

fn logging_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
    Error::Logging {
        source: Box::new(err),
        back: Backtrace::new(),
    }
}

/// Install the global subscriber. `RUST_LOG`, if set, overrides `level`. Must be called at most
/// once.
pub fn init_tracing(level: &str, syslog: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(logging_error)?,
    };

    let (diag, unavailable) = if syslog {
        match Layer::try_default() {
            Ok(layer) => (Some(layer.with_filter(LevelFilter::INFO)), None),
            Err(err) => (None, Some(err)),
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(diag)
        .try_init()
        .map_err(logging_error)?;

    if let Some(err) = unavailable {
        warn!("not copying diagnostics to syslog: {}", err);
    }
    Ok(())
}
