//! One live connection to one cluster node.
//!
//! A [`Session`] owns the stream behind an async mutex. All framed I/O goes
//! through a [`SessionGuard`], so one call at a time owns the connection and
//! call IDs are generated only while the connection is held.
//!
//! A call marks the connection in flight before writing its request and
//! clears the mark once the whole response is read. A guard that finds the
//! mark still set belongs to a call that was abandoned mid-exchange; the
//! stream position is unknown from then on, so the connection is shut down.

use crate::dial::Dialer;
use crate::error::{ProtocolError, SessionError};
use crate::handshake::send_hello;
use crate::transport::IoStream;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use yb_wire::Endpoint;

/// Check run over a freshly connected session before it is handed out
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Exercise the session; an error aborts the connect
    async fn probe(&self, session: &Arc<Session>) -> Result<(), SessionError>;
}

/// Probe that accepts every session
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProbe;

#[async_trait]
impl LivenessProbe for NoProbe {
    async fn probe(&self, _session: &Arc<Session>) -> Result<(), SessionError> {
        Ok(())
    }
}

#[derive(Debug)]
struct Connection {
    stream: Option<IoStream>,
    in_flight: bool,
}

/// A connection to a single node
#[derive(Debug)]
pub struct Session {
    endpoint: Endpoint,
    conn: Mutex<Connection>,
    call_count: AtomicI32,
}

impl Session {
    /// Dial `endpoint`, write the preamble and run `probe`.
    ///
    /// On probe failure the connection is closed and
    /// [`SessionError::Probe`] returned. Never retries.
    pub async fn connect(
        endpoint: &Endpoint,
        dialer: &dyn Dialer,
        probe: &dyn LivenessProbe,
    ) -> Result<Arc<Self>, SessionError> {
        debug!(%endpoint, "connecting");
        let mut stream = dialer.dial(endpoint).await?;

        if let Err(e) = send_hello(&mut stream).await {
            let _ = stream.shutdown().await;
            return Err(e);
        }

        let session = Arc::new(Self::from_stream(endpoint.clone(), stream));
        if let Err(source) = probe.probe(&session).await {
            debug!(%endpoint, error = %source, "liveness probe failed");
            if let Err(close_err) = session.close().await {
                debug!(%endpoint, error = %close_err, "close after failed probe");
            }
            return Err(SessionError::Probe {
                endpoint: endpoint.clone(),
                source: Box::new(source),
            });
        }

        debug!(%endpoint, "session established");
        Ok(session)
    }

    /// Wrap a stream whose preamble has already been sent
    pub fn from_stream(endpoint: Endpoint, stream: IoStream) -> Self {
        Self {
            endpoint,
            conn: Mutex::new(Connection {
                stream: Some(stream),
                in_flight: false,
            }),
            call_count: AtomicI32::new(0),
        }
    }

    /// Node this session is connected to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Take exclusive ownership of the connection
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            session: self,
            conn: self.conn.lock().await,
        }
    }

    /// Whether the session can no longer carry calls.
    ///
    /// True after [`Session::close`], after a framing failure, and when the
    /// last call was abandoned before its response was read.
    pub async fn is_closed(&self) -> bool {
        let conn = self.conn.lock().await;
        conn.stream.is_none() || conn.in_flight
    }

    /// Non-blocking [`Session::is_closed`]. A session busy with a call counts as open.
    pub fn is_defunct(&self) -> bool {
        match self.conn.try_lock() {
            Ok(conn) => conn.stream.is_none() || conn.in_flight,
            Err(_) => false,
        }
    }

    /// Shut the connection down. Waits for an in-flight call to finish.
    pub async fn close(&self) -> Result<(), SessionError> {
        let stream = self.conn.lock().await.stream.take();
        let Some(mut stream) = stream else {
            return Err(SessionError::Closed(self.endpoint.clone()));
        };

        debug!(endpoint = %self.endpoint, "closing session");
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            // Peer already gone
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exclusive access to a session's connection
#[derive(Debug)]
pub struct SessionGuard<'a> {
    session: &'a Session,
    conn: MutexGuard<'a, Connection>,
}

impl SessionGuard<'_> {
    /// Next call ID; the first call on a session gets 1.
    ///
    /// IDs are never reused: once `i32::MAX` has been handed out every
    /// further request fails with [`ProtocolError::CallIdsExhausted`].
    pub fn generate_call_id(&self) -> Result<i32, ProtocolError> {
        self.session
            .call_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(|_| ProtocolError::CallIdsExhausted)
    }

    /// Start an exchange: check the stream is in sync, allocate a call ID
    /// and mark the connection in flight.
    ///
    /// Fails with [`SessionError::Desynced`] and shuts the stream down when
    /// an earlier exchange was abandoned.
    pub async fn begin_call(&mut self) -> Result<i32, SessionError> {
        if self.conn.in_flight {
            let endpoint = self.session.endpoint.clone();
            warn!(%endpoint, "previous call abandoned mid-exchange, closing session");
            self.abort().await;
            return Err(SessionError::Desynced(endpoint));
        }
        self.stream()?;
        let call_id = self.generate_call_id()?;
        self.conn.in_flight = true;
        Ok(call_id)
    }

    /// Mark the exchange started by [`SessionGuard::begin_call`] as fully read
    pub fn finish_call(&mut self) {
        self.conn.in_flight = false;
    }

    /// Shut the stream down after a failure that left it out of sync
    pub async fn abort(&mut self) {
        self.conn.in_flight = false;
        if let Some(mut stream) = self.conn.stream.take() {
            debug!(endpoint = %self.session.endpoint, "shutting down out-of-sync session");
            if let Err(e) = stream.shutdown().await {
                debug!(endpoint = %self.session.endpoint, error = %e, "shutdown failed");
            }
        }
    }

    fn stream(&mut self) -> Result<&mut IoStream, SessionError> {
        let session = self.session;
        match &mut self.conn.stream {
            Some(stream) => Ok(stream),
            None => Err(SessionError::Closed(session.endpoint.clone())),
        }
    }

    /// Write all of `buf`, returning the number of bytes written
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, SessionError> {
        self.stream()?.write_all(buf).await?;
        Ok(buf.len())
    }

    /// Flush buffered writes
    pub async fn flush(&mut self) -> Result<(), SessionError> {
        self.stream()?.flush().await?;
        Ok(())
    }

    /// Single read; may return fewer bytes than `buf` holds, 0 at EOF
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        Ok(self.stream()?.read(buf).await?)
    }

    /// Fill `buf` completely
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        Ok(self.stream()?.read_exact(buf).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryDialer, Reply};
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    /// Probe that counts its runs and fails when told to
    struct CountingProbe {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LivenessProbe for CountingProbe {
        async fn probe(&self, session: &Arc<Session>) -> Result<(), SessionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SessionError::Closed(session.endpoint().clone()));
            }
            Ok(())
        }
    }

    fn echo_dialer(endpoint: &Endpoint) -> MemoryDialer {
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |_| Reply::Empty);
        dialer
    }

    #[tokio::test]
    async fn test_connect_runs_probe() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = echo_dialer(&endpoint);
        let probe = CountingProbe {
            runs: AtomicUsize::new(0),
            fail: false,
        };

        let session = Session::connect(&endpoint, &dialer, &probe).await.unwrap();
        assert_eq!(probe.runs.load(Ordering::SeqCst), 1);
        assert_eq!(session.endpoint(), &endpoint);
        assert!(!session.is_closed().await);
        assert_eq!(dialer.active_connections(&endpoint), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_closes_connection() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = echo_dialer(&endpoint);
        let probe = CountingProbe {
            runs: AtomicUsize::new(0),
            fail: true,
        };

        let err = Session::connect(&endpoint, &dialer, &probe).await.unwrap_err();
        assert!(matches!(err, SessionError::Probe { .. }));
        assert_eq!(dialer.dial_count(&endpoint), 1);
        dialer.wait_idle(&endpoint).await;
        assert_eq!(dialer.active_connections(&endpoint), 0);
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        let dialer = MemoryDialer::new();
        let endpoint = Endpoint::new("nowhere", 9100);
        let err = Session::connect(&endpoint, &dialer, &NoProbe)
            .await
            .unwrap_err();
        assert!(err.is_dial());
    }

    #[tokio::test]
    async fn test_close_twice() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = echo_dialer(&endpoint);
        let session = Session::connect(&endpoint, &dialer, &NoProbe).await.unwrap();

        session.close().await.unwrap();
        assert!(session.is_closed().await);
        assert!(matches!(
            session.close().await,
            Err(SessionError::Closed(ref e)) if *e == endpoint
        ));

        let mut guard = session.lock().await;
        assert!(matches!(
            guard.write(b"late").await,
            Err(SessionError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_call_ids_unique_across_tasks() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = echo_dialer(&endpoint);
        let session = Session::connect(&endpoint, &dialer, &NoProbe).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..50 {
                    ids.push(session.lock().await.generate_call_id().unwrap());
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate call id {}", id);
            }
        }
        assert_eq!(seen.len(), 400);
        assert_eq!(seen.iter().min(), Some(&1));
        assert_eq!(seen.iter().max(), Some(&400));
    }

    #[tokio::test]
    async fn test_call_ids_never_wrap() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = echo_dialer(&endpoint);
        let session = Session::connect(&endpoint, &dialer, &NoProbe).await.unwrap();
        session.call_count.store(i32::MAX - 1, Ordering::SeqCst);

        let mut guard = session.lock().await;
        assert_eq!(guard.generate_call_id().unwrap(), i32::MAX);
        assert!(matches!(
            guard.generate_call_id(),
            Err(ProtocolError::CallIdsExhausted)
        ));
        assert!(matches!(
            guard.begin_call().await,
            Err(SessionError::Protocol(ProtocolError::CallIdsExhausted))
        ));
        assert_eq!(session.call_count.load(Ordering::SeqCst), i32::MAX);
    }

    #[tokio::test]
    async fn test_abandoned_call_closes_session() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = echo_dialer(&endpoint);
        let session = Session::connect(&endpoint, &dialer, &NoProbe).await.unwrap();

        {
            let mut guard = session.lock().await;
            assert_eq!(guard.begin_call().await.unwrap(), 1);
            guard.write(&[0u8, 0]).await.unwrap();
        }
        assert!(session.is_defunct());
        assert!(session.is_closed().await);

        let mut guard = session.lock().await;
        assert!(matches!(
            guard.begin_call().await,
            Err(SessionError::Desynced(ref e)) if *e == endpoint
        ));
        assert!(matches!(
            guard.begin_call().await,
            Err(SessionError::Closed(_))
        ));
        drop(guard);

        dialer.wait_idle(&endpoint).await;
        assert_eq!(dialer.active_connections(&endpoint), 0);
    }

    #[tokio::test]
    async fn test_finished_call_keeps_session_open() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = echo_dialer(&endpoint);
        let session = Session::connect(&endpoint, &dialer, &NoProbe).await.unwrap();

        {
            let mut guard = session.lock().await;
            guard.begin_call().await.unwrap();
            guard.finish_call();
        }
        assert!(!session.is_defunct());
        assert_eq!(session.lock().await.begin_call().await.unwrap(), 2);
    }
}
