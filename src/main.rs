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

//! logship: connect to the record source, then ship records until told to stop.

use logship::{
    config::{Cli, Config, RecordSource},
    error::{Error, Result},
    logging::init_tracing,
    pipeline::Pipeline,
    record::read_request,
};

use backtrace::Backtrace;
use clap::Parser;
use tokio::{
    io::{AsyncRead, AsyncWriteExt},
    net::UnixStream,
    signal::unix::{signal, SignalKind},
};
use tracing::{debug, error, warn};

use std::{path::Path, process::ExitCode, time::Duration};

/// How many times to try the record source before giving up
const SOURCE_TRIES: usize = 5;
const SOURCE_RETRY_DELAY: Duration = Duration::from_secs(1);

async fn connect_source(path: &Path) -> Result<UnixStream> {
    let mut tries = 0;
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                tries += 1;
                if tries >= SOURCE_TRIES {
                    return Err(Error::NoRecordSource {
                        path: path.to_path_buf(),
                        tries,
                        source: err,
                        back: Backtrace::new(),
                    });
                }
                warn!(
                    "Failed to reach the record source at {}: {}",
                    path.display(),
                    err
                );
                tokio::time::sleep(SOURCE_RETRY_DELAY).await;
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            warn!("Failed to install a SIGTERM handler: {}", err);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => (),
        _ = term.recv() => (),
    }
}

async fn ship(config: Config) -> Result<()> {
    let source: Box<dyn AsyncRead + Unpin> = match &config.source {
        RecordSource::Stdin => Box::new(tokio::io::stdin()),
        RecordSource::Socket(path) => {
            let mut stream = connect_source(path).await?;
            stream
                .write_all(&read_request(config.requested_lines()))
                .await?;
            debug!("connected to the record source at {}", path.display());
            Box::new(stream)
        }
    };

    if config.follow {
        if let Some(pid_file) = &config.pid_file {
            if let Err(err) = std::fs::write(pid_file, std::process::id().to_string()) {
                warn!("Failed to write {}: {}", pid_file.display(), err);
            }
        }
    }

    let mut pipeline = Pipeline::new(config.filter(), config.renderer(), config.sink()?);
    pipeline
        .run(source, config.follow, shutdown_signal())
        .await
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help & --version come through here, too
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(err) = init_tracing(&cli.log_level, cli.remote.is_some()) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start the event loop: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(ship(config)) {
        Ok(()) => {
            debug!("done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
