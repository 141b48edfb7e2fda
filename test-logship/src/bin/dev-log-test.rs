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

//! Send logship-style diagnostics to `/dev/log` on the local host.

use logship::layer::Layer;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let subscriber = Registry::default().with(Layer::try_default().unwrap());
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("你好, Unix domain socket.");
    debug!("你好, Unix domain socket.");
    info!("connected to {}:{}", "127.0.0.1", 5514);
    warn!("failed to send log data to {}:{} via {}", "127.0.0.1", 5514, "tcp");
    error!("你好, Unix domain socket.");
}
