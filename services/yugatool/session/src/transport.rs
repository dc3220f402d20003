//! TCP and TLS transport for RPC sessions.
//!
//! This module provides the stream type every dialer hands back, so the
//! session layer works the same over plain TCP, TLS, or an in-process pipe.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;
use yb_wire::Endpoint;

/// Unified stream type that can be plain TCP, TLS, or in-memory
pub enum IoStream {
    /// Plain TCP stream
    Plain(TcpStream),
    /// TLS client stream
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
    /// In-process pipe (loopback harnesses and tests)
    Memory(DuplexStream),
}

impl AsyncRead for IoStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            IoStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            IoStream::Memory(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IoStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            IoStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            IoStream::Memory(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            IoStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            IoStream::Memory(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            IoStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            IoStream::Memory(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl IoStream {
    /// Get the peer address of the underlying socket, if there is one
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            IoStream::Plain(stream) => stream.peer_addr().ok(),
            IoStream::Tls(stream) => stream.get_ref().0.peer_addr().ok(),
            IoStream::Memory(_) => None,
        }
    }

    /// Whether the stream is TLS protected
    pub fn is_tls(&self) -> bool {
        matches!(self, IoStream::Tls(_))
    }
}

/// Open a TCP connection to `endpoint` with Nagle disabled
pub async fn connect_tcp(endpoint: &Endpoint) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

impl std::fmt::Debug for IoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoStream::Plain(_) => write!(f, "IoStream::Plain({:?})", self.peer_addr()),
            IoStream::Tls(_) => write!(f, "IoStream::Tls({:?})", self.peer_addr()),
            IoStream::Memory(_) => write!(f, "IoStream::Memory"),
        }
    }
}
