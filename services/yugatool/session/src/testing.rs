//! In-memory fake servers for development and testing.
//!
//! [`MemoryDialer`] hands out in-process pipes whose far end runs [`serve`],
//! a minimal server speaking the wire protocol and answering each request
//! through a caller-supplied handler.

use crate::dial::Dialer;
use crate::error::SessionError;
use crate::handshake::recv_hello;
use crate::transport::IoStream;
use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use yb_wire::{
    decode_frame_len, encode_frame_len, Endpoint, ErrorStatusPb, RequestFrame, ResponseFrame,
    FRAME_LEN_SIZE,
};

/// What the fake server sends back for one request
#[derive(Debug, Clone)]
pub enum Reply {
    /// Successful response with this encoded body
    Message(Bytes),
    /// Successful response with nothing after the header
    Empty,
    /// Error response
    Error(ErrorStatusPb),
    /// Pre-encoded frame payload, sent as is
    Raw(Bytes),
    /// Drop the connection without answering
    Hangup,
    /// Wait, then send the inner reply
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    /// Successful response carrying `message`
    pub fn message<M: Message>(message: &M) -> Self {
        Reply::Message(Bytes::from(message.encode_to_vec()))
    }
}

/// Request handler run by the fake server
pub type Handler = Arc<dyn Fn(&RequestFrame) -> Reply + Send + Sync>;

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Serve one connection until the client goes away.
///
/// `keepalives` empty frames are written in front of every response.
pub async fn serve<S>(mut stream: S, handler: Handler, keepalives: usize) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    recv_hello(&mut stream).await?;

    loop {
        let mut prefix = [0u8; FRAME_LEN_SIZE];
        match stream.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
        let Some(len) = decode_frame_len(prefix) else {
            continue;
        };

        let mut payload = vec![0u8; len as usize];
        stream.read_exact(&mut payload).await?;
        let request = RequestFrame::decode_payload(Bytes::from(payload)).map_err(invalid_data)?;
        let call_id = request.header.call_id;

        let mut reply = handler(&request);
        let response = loop {
            reply = match reply {
                Reply::Message(body) => break ResponseFrame::success(call_id, body).encode_payload(),
                Reply::Empty => break ResponseFrame::empty(call_id).encode_payload(),
                Reply::Error(status) => break ResponseFrame::error(call_id, &status).encode_payload(),
                Reply::Raw(payload) => break payload,
                Reply::Hangup => return Ok(()),
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    *inner
                }
            };
        };

        for _ in 0..keepalives {
            stream.write_all(&[0u8; FRAME_LEN_SIZE]).await?;
        }
        let prefix = encode_frame_len(response.len()).map_err(invalid_data)?;
        stream.write_all(&prefix).await?;
        stream.write_all(&response).await?;
        stream.flush().await?;
    }
}

struct FakeServer {
    handler: Handler,
    active: Arc<AtomicUsize>,
    keepalives: usize,
}

#[derive(Default)]
struct State {
    servers: HashMap<Endpoint, FakeServer>,
    dials: HashMap<Endpoint, usize>,
}

/// Decrements the active-connection counter when a fake connection ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Dialer connecting to in-process fake servers.
///
/// Unregistered endpoints refuse connections. Every dial attempt is
/// counted, reachable or not.
#[derive(Clone, Default)]
pub struct MemoryDialer {
    state: Arc<Mutex<State>>,
}

impl MemoryDialer {
    /// Create a dialer with no reachable endpoints
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `endpoint` reachable, answering requests with `handler`
    pub fn register<F>(&self, endpoint: Endpoint, handler: F)
    where
        F: Fn(&RequestFrame) -> Reply + Send + Sync + 'static,
    {
        let mut state = self.state();
        let handler: Handler = Arc::new(handler);
        match state.servers.get_mut(&endpoint) {
            Some(server) => server.handler = handler,
            None => {
                state.servers.insert(
                    endpoint,
                    FakeServer {
                        handler,
                        active: Arc::new(AtomicUsize::new(0)),
                        keepalives: 0,
                    },
                );
            }
        }
    }

    /// Make `endpoint` refuse new connections. Open ones keep running.
    pub fn unregister(&self, endpoint: &Endpoint) {
        self.state().servers.remove(endpoint);
    }

    /// Send `count` empty frames ahead of every response from `endpoint`
    pub fn set_keepalives_before_reply(&self, endpoint: &Endpoint, count: usize) {
        if let Some(server) = self.state().servers.get_mut(endpoint) {
            server.keepalives = count;
        }
    }

    /// Number of dial attempts made to `endpoint`
    pub fn dial_count(&self, endpoint: &Endpoint) -> usize {
        self.state().dials.get(endpoint).copied().unwrap_or(0)
    }

    /// Total dial attempts across all endpoints
    pub fn total_dials(&self) -> usize {
        self.state().dials.values().sum()
    }

    /// Connections to `endpoint` whose server side is still running
    pub fn active_connections(&self, endpoint: &Endpoint) -> usize {
        self.state()
            .servers
            .get(endpoint)
            .map(|server| server.active.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Wait (up to five seconds) until `endpoint` has no open connections
    pub async fn wait_idle(&self, endpoint: &Endpoint) {
        for _ in 0..1000 {
            if self.active_connections(endpoint) == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl fmt::Debug for MemoryDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        let mut endpoints: Vec<_> = state.servers.keys().map(ToString::to_string).collect();
        endpoints.sort();
        f.debug_struct("MemoryDialer")
            .field("endpoints", &endpoints)
            .finish()
    }
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<IoStream, SessionError> {
        let (handler, active, keepalives) = {
            let mut state = self.state();
            *state.dials.entry(endpoint.clone()).or_insert(0) += 1;
            match state.servers.get(endpoint) {
                Some(server) => (
                    server.handler.clone(),
                    server.active.clone(),
                    server.keepalives,
                ),
                None => {
                    return Err(SessionError::Dial {
                        endpoint: endpoint.clone(),
                        source: io::Error::new(
                            io::ErrorKind::ConnectionRefused,
                            "connection refused",
                        ),
                    })
                }
            }
        };

        let (client, server) = tokio::io::duplex(64 * 1024);
        active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(active);
        let peer = endpoint.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = serve(server, handler, keepalives).await {
                debug!(endpoint = %peer, error = %e, "fake server connection ended");
            }
        });

        Ok(IoStream::Memory(client))
    }
}
