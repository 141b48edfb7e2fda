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

//! The transport layer.
//!
//! Two kinds of thing get sent over sockets by [logship](crate):
//!
//! 1. rendered records, to a remote collector over TCP or UDP: see [`Link`]. These live on the
//!    event loop, so they're `tokio` sockets.
//!
//! 2. our own diagnostics, to the local syslog daemon: see [`Transport`] & [`UnixSocket`]. These
//!    are sent from inside a `tracing` layer, which offers us no opportunity to `.await`, so they
//!    go over a plain blocking datagram socket.
//!
//! # Examples
//!
//! ```rust
//! use logship::transport::UnixSocket;
//! let transpo = UnixSocket::new("/i/am/not/there.s");
//! assert!(transpo.is_err()); // no such socket, after all
//! ```

use crate::error::{Error, Result};

use backtrace::Backtrace;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, UdpSocket},
};

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    os::unix::net::UnixDatagram,
    path::Path,
};

fn transport_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
    Error::Transport {
        source: Box::new(err),
        back: Backtrace::new(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         network links                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Which protocol to forward records over
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Protocol::Tcp => "tcp",
                Protocol::Udp => "udp",
            }
        )
    }
}

/// A TCP connection to the collector.
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    pub async fn connect(host: &str, port: u16) -> Result<TcpLink> {
        Ok(TcpLink {
            stream: TcpStream::connect((host, port))
                .await
                .map_err(transport_error)?,
        })
    }
    async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write_all(buf).await.map_err(transport_error)?;
        Ok(buf.len())
    }
    /// Resolves once the peer has closed its end of the connection (or the socket has failed).
    /// Anything the peer sends us in the meantime is read & discarded.
    async fn closed(&mut self) {
        let mut scratch = [0u8; 512];
        loop {
            if self.stream.readable().await.is_err() {
                return;
            }
            match self.stream.try_read(&mut scratch) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(_) => return,
            }
        }
    }
}

/// A UDP "connection" to the collector: a local socket with a default destination.
pub struct UdpLink {
    socket: UdpSocket,
}

impl UdpLink {
    pub async fn connect(host: &str, port: u16) -> Result<UdpLink> {
        let peer = tokio::net::lookup_host((host, port))
            .await
            .map_err(transport_error)?
            .next()
            .ok_or_else(|| {
                transport_error(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} did not resolve", host),
                ))
            })?;
        // Bind to any available port on the matching unspecified address...
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await.map_err(transport_error)?;
        // and connect to the collector at `peer`:
        socket.connect(peer).await.map_err(transport_error)?;
        Ok(UdpLink { socket })
    }
    async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        self.socket.send(buf).await.map_err(transport_error)
    }
}

/// A live connection to the collector.
pub enum Link {
    Tcp(TcpLink),
    Udp(UdpLink),
}

impl Link {
    pub async fn connect(protocol: Protocol, host: &str, port: u16) -> Result<Link> {
        match protocol {
            Protocol::Tcp => Ok(Link::Tcp(TcpLink::connect(host, port).await?)),
            Protocol::Udp => Ok(Link::Udp(UdpLink::connect(host, port).await?)),
        }
    }
    /// Send one fully-framed record.
    pub async fn send(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            Link::Tcp(link) => link.send(buf).await,
            Link::Udp(link) => link.send(buf).await,
        }
    }
    /// Resolves when the peer goes away. Datagram links have no peer to lose, so for them this
    /// never resolves.
    pub async fn closed(&mut self) {
        match self {
            Link::Tcp(link) => link.closed().await,
            Link::Udp(_) => std::future::pending().await,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                   local diagnostic transports                                  //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all (blocking) diagnostic transports must support.
pub trait Transport {
    /// Send a slice of byte on this transport mechanism.
    ///
    /// UDP, TCP & Unix sockets all operate on a contiguous slice of `u8`, so we require that our
    /// caller assemble one.
    fn send(&self, buf: &[u8]) -> Result<usize>;
}

/// Sending syslog messages via Unix socket (datagram)
pub struct UnixSocket {
    socket: UnixDatagram,
}

impl UnixSocket {
    /// Construct a [`Transport`] implementation via Unix datagram sockets at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<UnixSocket> {
        let sock = UnixDatagram::unbound().map_err(transport_error)?;
        sock.connect(path).map_err(transport_error)?;
        Ok(UnixSocket { socket: sock })
    }
    pub fn try_default() -> Result<UnixSocket> {
        UnixSocket::new("/dev/log")
    }
}

impl Transport for UnixSocket {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        let cb_written = self.socket.send(buf).map_err(transport_error)?;
        Ok(cb_written)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn tcp_link() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut link = Link::connect(Protocol::Tcp, "127.0.0.1", port)
            .await
            .unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        assert_eq!(link.send(b"hello\n").await.unwrap(), 6);
        let mut buf = [0u8; 6];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");

        // Peer chatter doesn't count as a close...
        peer.write_all(b"ignored").await.unwrap();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(100), link.closed()).await;
        assert!(waited.is_err());

        // but hanging up does.
        drop(peer);
        tokio::time::timeout(std::time::Duration::from_secs(5), link.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn udp_link() {
        let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = collector.local_addr().unwrap().port();

        let mut link = Link::connect(Protocol::Udp, "127.0.0.1", port)
            .await
            .unwrap();
        assert_eq!(link.send(b"<14>hello").await.unwrap(), 9);

        let mut buf = [0u8; 64];
        let n = collector.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<14>hello");

        // Datagram links never report a close
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), link.closed()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn refused() {
        // Grab a free port, then give it up so nobody is listening there
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        assert!(Link::connect(Protocol::Tcp, "127.0.0.1", port).await.is_err());
    }

    #[test]
    fn unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sock");
        let daemon = UnixDatagram::bind(&path).unwrap();

        let transpo = UnixSocket::new(&path).unwrap();
        assert_eq!(transpo.send(b"<30>hi").unwrap(), 6);
        let mut buf = [0u8; 16];
        let n = daemon.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"<30>hi");

        assert!(UnixSocket::new(dir.path().join("nobody-home")).is_err());
    }
}
