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

//! The delivery loop
//! =================
//!
//! # Introduction
//!
//! [`Pipeline`] ties everything together: bytes read from the record source are decoded into
//! [`LogEvent`]s, each of which is filtered, rendered & written to the [`Sink`], strictly in the
//! order in which they arrived.
//!
//! [`Pipeline::run`] waits on three things at once:
//!
//! 1. more bytes from the record source
//! 2. the sink's link (a reconnect falling due, or the collector hanging up)
//! 3. a request to shut down
//!
//! and handles exactly one of them at a time. Writes & connection attempts happen inline, so a
//! collector that stops reading without closing its end will eventually stall the loop; there is
//! no per-record timeout.
//!
//! # Failures
//!
//! A record that can't be rendered (because it would overflow the render buffer), or that can't be
//! written, is reported & dropped. Fatal errors (see [`Error::is_fatal`]) end the loop.

use crate::{
    error::{Error, Result},
    filter::Filter,
    formatter::{RecordFormatter, Renderer},
    record::{Decoder, Frame, LogEvent},
    sink::{LinkEvent, Sink},
};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use std::future::Future;

/// What woke the loop up
enum Wake {
    Data(std::io::Result<usize>),
    Link(LinkEvent),
    Shutdown,
}

/// Everything needed to take a record from bytes-on-the-wire to the sink.
pub struct Pipeline {
    filter: Filter,
    renderer: Renderer,
    sink: Sink,
    decoder: Decoder,
}

impl Pipeline {
    pub fn new(filter: Filter, renderer: Renderer, sink: Sink) -> Pipeline {
        Pipeline {
            filter,
            renderer,
            sink,
            decoder: Decoder::new(),
        }
    }
    /// Filter, render & write a single event.
    ///
    /// Returns `Ok(true)` if the event made it to the sink (or was accepted by a sink that is
    /// presently dropping records), `Ok(false)` if it was filtered out or too long to render.
    pub async fn deliver(&mut self, event: &LogEvent) -> Result<bool> {
        if !self.filter.accepts(&event.message) {
            return Ok(false);
        }
        let rendered = match self.renderer.format(event) {
            Ok(rendered) => rendered,
            Err(err @ Error::TooLong { .. }) => {
                warn!("{}", err);
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        self.sink
            .write(&rendered, self.renderer.is_templated())
            .await?;
        Ok(true)
    }
    /// Deliver every complete record currently buffered.
    async fn drain(&mut self) -> Result<()> {
        while let Some(frame) = self.decoder.next_frame()? {
            match frame {
                Frame::Event(event) => {
                    if let Err(err) = self.deliver(&event).await {
                        if err.is_fatal() {
                            return Err(err);
                        }
                        warn!("dropped record {}: {}", event.id, err);
                    }
                }
                Frame::Malformed => debug!("dropping a record with missing or mistyped fields"),
            }
        }
        Ok(())
    }
    /// Append `chunk` to the decode buffer & deliver whatever complete records that yields.
    pub async fn ingest(&mut self, chunk: &[u8]) -> Result<()> {
        self.decoder.extend(chunk);
        self.drain().await
    }
    /// Run until the record source reaches end-of-stream, `shutdown` resolves, or something fatal
    /// happens.
    pub async fn run<R, F>(&mut self, mut source: R, follow: bool, shutdown: F) -> Result<()>
    where
        R: AsyncRead + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            self.decoder.buffer_mut().reserve(4096);
            let wake = tokio::select! {
                res = source.read_buf(self.decoder.buffer_mut()) => Wake::Data(res),
                ev = self.sink.next_event() => Wake::Link(ev),
                _ = &mut shutdown => Wake::Shutdown,
            };
            match wake {
                Wake::Data(Ok(0)) => {
                    if self.decoder.buffered() > 0 {
                        debug!(
                            "discarding {} bytes of incomplete record",
                            self.decoder.buffered()
                        );
                    }
                    if follow {
                        info!("the record source closed the stream");
                    } else {
                        debug!("end of stream");
                    }
                    return Ok(());
                }
                Wake::Data(Ok(n)) => {
                    debug!("read {} bytes from the record source", n);
                    self.drain().await?;
                }
                Wake::Data(Err(err)) => return Err(err.into()),
                Wake::Link(ev) => self.sink.handle(ev).await,
                Wake::Shutdown => {
                    info!("shutting down");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::{
        facility::Priority,
        formatter::{Classic, Relay, Templated, Zone},
        record::{FrameBuilder, Source},
        sink::{FileSink, NetworkSink, Trailer},
        template::Template,
        transport::Protocol,
    };

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use std::time::Duration;

    fn event(message: &str, priority: u32, source: Source) -> LogEvent {
        LogEvent {
            message: message.to_string(),
            id: 7,
            priority: Priority(priority),
            source,
            timestamp_ms: 1_700_000_000_000,
        }
    }

    fn frames(events: &[LogEvent]) -> Vec<u8> {
        events.iter().flat_map(|ev| ev.to_frame().to_vec()).collect()
    }

    fn file_pipeline(path: &std::path::Path, filter: Filter, renderer: Renderer) -> Pipeline {
        Pipeline::new(
            filter,
            renderer,
            Sink::File(FileSink::open(path, None).unwrap()),
        )
    }

    #[tokio::test]
    async fn link_up_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages");
        let mut p = file_pipeline(
            &path,
            Filter::accept_all(),
            Renderer::Classic(Classic::new(false, Zone::Utc)),
        );
        let input = frames(&[event("link up", 134, Source::Syslog)]);
        p.run(&input[..], false, std::future::pending()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Tue Nov 14 22:13:20 2023 local0.info link up\n"
        );
    }

    #[tokio::test]
    async fn filtering_and_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages");
        let mut p = file_pipeline(
            &path,
            Filter::new("up$").unwrap(),
            Renderer::Templated(Templated::new(Template::parse("%priority% %message%"), true)),
        );
        let mut input = frames(&[
            event("eth0 up", 30, Source::Syslog),
            event("eth0 down", 30, Source::Syslog),
        ]);
        // Well-framed, but lacking most of the fields
        input.extend_from_slice(&FrameBuilder::new().string("msg", "wlan0 up").finish());
        input.extend(frames(&[event("wlan0 up", 31, Source::Kernel)]));

        p.run(&input[..], false, std::future::pending()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "30 eth0 up\n31 wlan0 up\n"
        );
    }

    #[tokio::test]
    async fn chunk_boundaries_dont_matter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages");
        let mut p = file_pipeline(
            &path,
            Filter::accept_all(),
            Renderer::Templated(Templated::new(Template::parse("%message%"), true)),
        );
        let input = frames(&[
            event("one", 6, Source::Syslog),
            event("two", 6, Source::Syslog),
            event("three", 6, Source::Syslog),
        ]);
        for chunk in input.chunks(5) {
            p.ingest(chunk).await.unwrap();
        }
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "one\ntwo\nthree\n"
        );
    }

    #[tokio::test]
    async fn overflow_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages");
        let mut p = file_pipeline(
            &path,
            Filter::accept_all(),
            Renderer::Templated(Templated::new(Template::parse("%message%"), true)),
        );
        let huge = "x".repeat(600);
        assert!(!p.deliver(&event(&huge, 6, Source::Syslog)).await.unwrap());
        assert!(p.deliver(&event("small", 6, Source::Syslog)).await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "small\n");
    }

    #[tokio::test]
    async fn corrupt_framing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages");
        let mut p = file_pipeline(
            &path,
            Filter::accept_all(),
            Renderer::Templated(Templated::new(Template::parse("%message%"), true)),
        );
        let mut input = frames(&[event("before", 6, Source::Syslog)]);
        input.extend_from_slice(&[0, 0, 0, 2, 0xde, 0xad, 0xbe, 0xef]);
        input.extend(frames(&[event("after", 6, Source::Syslog)]));

        let err = p
            .run(&input[..], false, std::future::pending())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::BadFrame { raw_len: 2, .. }));
        assert!(err.is_fatal());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "before\n");
    }

    #[tokio::test]
    async fn tcp_delivery() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut net = NetworkSink::new("127.0.0.1", port, Protocol::Tcp, Trailer::Newline);
        net.reconnect().await;
        assert!(net.is_connected());
        let (mut peer, _) = listener.accept().await.unwrap();

        let relay = Relay::builder()
            .hostname(Some("bree".to_string()))
            .zone(Zone::Utc)
            .build();
        let mut p = Pipeline::new(
            Filter::accept_all(),
            Renderer::Relay(relay),
            Sink::Network(net),
        );
        let input = frames(&[
            event("link up", 134, Source::Syslog),
            event("oops", 3, Source::Kernel),
        ]);
        p.run(&input[..], false, std::future::pending()).await.unwrap();
        drop(p);

        let mut received = String::new();
        peer.read_to_string(&mut received).await.unwrap();
        assert_eq!(
            received,
            "<134>Nov 14 22:13:20 bree link up\n<3>Nov 14 22:13:20 bree kernel: oops\n"
        );
    }

    /// A collector that accepts but never reads eventually blocks delivery: writes have no
    /// timeout of their own.
    #[tokio::test]
    async fn stalled_peer_blocks_delivery() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut net = NetworkSink::new("127.0.0.1", port, Protocol::Tcp, Trailer::Newline);
        net.reconnect().await;
        assert!(net.is_connected());
        let (peer, _) = listener.accept().await.unwrap();

        let mut p = Pipeline::new(
            Filter::accept_all(),
            Renderer::Relay(Relay::builder().hostname(Some("bree".to_string())).build()),
            Sink::Network(net),
        );
        let ev = event(&"x".repeat(64 * 1024), 6, Source::Syslog);

        // Fill the socket buffers on both ends; well before 64MiB the next write can't complete.
        let mut stalled = false;
        for _ in 0..1024 {
            match tokio::time::timeout(Duration::from_millis(250), p.deliver(&ev)).await {
                Ok(res) => assert!(res.unwrap()),
                Err(_) => {
                    stalled = true;
                    break;
                }
            }
        }
        assert!(stalled);

        // ...and stays blocked for as long as the peer holds its end open without reading.
        assert!(
            tokio::time::timeout(Duration::from_millis(250), p.deliver(&ev))
                .await
                .is_err()
        );
        drop(peer);
    }

    #[tokio::test]
    async fn reconnect_then_deliver() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (mut upstream, source) = tokio::io::duplex(4096);

        let task = tokio::spawn(async move {
            let mut p = Pipeline::new(
                Filter::accept_all(),
                Renderer::Templated(Templated::new(Template::parse("%message%"), false)),
                Sink::Network(NetworkSink::new(
                    "127.0.0.1",
                    port,
                    Protocol::Tcp,
                    Trailer::Nul,
                )),
            );
            p.run(source, true, std::future::pending()).await
        });

        // First connection, one record...
        let (mut peer, _) = listener.accept().await.unwrap();
        upstream
            .write_all(&frames(&[event("first", 6, Source::Syslog)]))
            .await
            .unwrap();
        let mut buf = [0u8; 6];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"first\0");

        // then the collector goes away. The client notices, waits out the retry delay &
        // reconnects.
        drop(peer);
        let (mut peer, _) = listener.accept().await.unwrap();
        upstream
            .write_all(&frames(&[event("second", 6, Source::Syslog)]))
            .await
            .unwrap();
        let mut buf = [0u8; 7];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"second\0");

        // End of stream ends the loop, even when following
        drop(upstream);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("messages");
        let mut p = file_pipeline(
            &path,
            Filter::accept_all(),
            Renderer::Classic(Classic::new(true, Zone::Utc)),
        );
        // The writer half stays alive, so the stream never ends on its own
        let (_upstream, source) = tokio::io::duplex(64);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();
        p.run(source, true, async {
            let _ = rx.await;
        })
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
