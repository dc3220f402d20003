//! Request/response exchange over a session.
//!
//! The [`Messenger`] trait is the seam typed service stubs are built on:
//! anything that can turn `(service, method, request bytes)` into response
//! bytes can sit underneath them. [`SessionMessenger`] is the wire
//! implementation.

use crate::error::{ProtocolError, RpcError, SessionError};
use crate::session::{Session, SessionGuard};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use prost::Message;
use std::sync::Arc;
use tracing::{debug, trace};
use yb_wire::{
    decode_frame_len, encode_frame_len, Endpoint, RequestFrame, ResponseFrame, WireError,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_TIMEOUT_MILLIS, FRAME_LEN_SIZE,
};

/// Sends one request and returns the matching response body
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Node the messages go to
    fn host(&self) -> &Endpoint;

    /// Call `service.method` with an encoded request
    async fn send_raw(
        &self,
        service: &str,
        method: &str,
        request: Bytes,
    ) -> Result<Bytes, SessionError>;
}

/// Call `service.method` with a typed request and decode a typed response
pub async fn send_message<M, Req, Resp>(
    messenger: &M,
    service: &str,
    method: &str,
    request: &Req,
) -> Result<Resp, SessionError>
where
    M: Messenger + ?Sized,
    Req: Message,
    Resp: Message + Default,
{
    let body = Bytes::from(request.encode_to_vec());
    let response = messenger.send_raw(service, method, body).await?;
    Resp::decode(response).map_err(|source| {
        ProtocolError::Decode {
            service: service.to_string(),
            method: method.to_string(),
            source,
        }
        .into()
    })
}

/// [`Messenger`] speaking the wire protocol over a [`Session`]
#[derive(Debug, Clone)]
pub struct SessionMessenger {
    session: Arc<Session>,
    timeout_millis: u32,
    max_frame_size: usize,
}

impl SessionMessenger {
    /// Create a messenger with the default advisory timeout and frame limit
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            timeout_millis: DEFAULT_TIMEOUT_MILLIS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the advisory timeout sent in each request header
    pub fn with_timeout_millis(mut self, timeout_millis: u32) -> Self {
        self.timeout_millis = timeout_millis;
        self
    }

    /// Set the largest response payload accepted
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Underlying session
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    async fn write_request(
        &self,
        conn: &mut SessionGuard<'_>,
        frame: &RequestFrame,
    ) -> Result<(), SessionError> {
        let payload = frame.encode_payload();
        let prefix = encode_frame_len(payload.len()).map_err(ProtocolError::from)?;

        if conn.write(&prefix).await? != FRAME_LEN_SIZE {
            return Err(ProtocolError::ShortLengthWrite.into());
        }
        let written = conn.write(&payload).await?;
        if written != payload.len() {
            return Err(ProtocolError::ShortFrameWrite {
                written,
                expected: payload.len(),
            }
            .into());
        }
        conn.flush().await
    }

    async fn read_response(
        &self,
        conn: &mut SessionGuard<'_>,
        call_id: i32,
    ) -> Result<ResponseFrame, SessionError> {
        let len = loop {
            let mut prefix = [0u8; FRAME_LEN_SIZE];
            conn.read_exact(&mut prefix).await.map_err(|e| match e {
                SessionError::Io(source) => {
                    SessionError::from(ProtocolError::FrameLength { call_id, source })
                }
                other => other,
            })?;
            match decode_frame_len(prefix) {
                Some(len) => break len as usize,
                None => trace!(call_id, "skipping empty frame"),
            }
        };

        if len > self.max_frame_size {
            return Err(ProtocolError::Wire(WireError::Size(len)).into());
        }

        let mut buf = BytesMut::zeroed(len);
        let mut filled = 0;
        while filled < len {
            let n = conn.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(ProtocolError::ShortRead {
                    read: filled,
                    expected: len,
                }
                .into());
            }
            filled += n;
        }

        ResponseFrame::decode_payload(buf.freeze()).map_err(|e| ProtocolError::from(e).into())
    }

    /// Write `frame` and read its response. Any error leaves the stream out of sync.
    async fn exchange(
        &self,
        conn: &mut SessionGuard<'_>,
        frame: &RequestFrame,
    ) -> Result<ResponseFrame, SessionError> {
        let call_id = frame.header.call_id;
        self.write_request(conn, frame).await?;

        let response = self.read_response(conn, call_id).await?;
        if response.header.call_id != call_id {
            return Err(ProtocolError::CallIdMismatch {
                expected: call_id,
                actual: response.header.call_id,
            }
            .into());
        }
        Ok(response)
    }
}

#[async_trait]
impl Messenger for SessionMessenger {
    fn host(&self) -> &Endpoint {
        self.session.endpoint()
    }

    async fn send_raw(
        &self,
        service: &str,
        method: &str,
        request: Bytes,
    ) -> Result<Bytes, SessionError> {
        let mut conn = self.session.lock().await;
        let call_id = conn.begin_call().await?;
        let frame = RequestFrame::new(call_id, service, method, self.timeout_millis, request);

        debug!(
            endpoint = %self.host(),
            call_id,
            service,
            method,
            "sending request"
        );
        let response = match self.exchange(&mut conn, &frame).await {
            Ok(response) => response,
            Err(e) => {
                debug!(endpoint = %self.host(), call_id, error = %e, "exchange failed, closing session");
                conn.abort().await;
                return Err(e);
            }
        };
        conn.finish_call();

        if response.is_error() {
            let status = response.error_status().map_err(ProtocolError::from)?;
            let err = RpcError::from(status);
            debug!(endpoint = %self.host(), call_id, service, method, error = %err, "remote error");
            return Err(err.into());
        }

        trace!(call_id, len = response.body.as_ref().map(Bytes::len), "received response");
        Ok(response.body.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::NoProbe;
    use crate::testing::{MemoryDialer, Reply};
    use std::time::Duration;
    use yb_wire::{ErrorStatusPb, RemoteMethodPb, RpcErrorCode};

    const SERVICE: &str = "yb.test.EchoService";

    async fn connect(dialer: &MemoryDialer, endpoint: &Endpoint) -> SessionMessenger {
        let session = Session::connect(endpoint, dialer, &NoProbe).await.unwrap();
        SessionMessenger::new(session)
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |req| Reply::Message(req.body.clone()));
        let messenger = connect(&dialer, &endpoint).await;

        let request = RemoteMethodPb {
            service_name: "a".to_string(),
            method_name: "b".to_string(),
        };
        let response: RemoteMethodPb = send_message(&messenger, SERVICE, "Echo", &request)
            .await
            .unwrap();
        assert_eq!(response, request);
        assert_eq!(messenger.host(), &endpoint);
    }

    #[tokio::test]
    async fn test_request_header_contents() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |req| {
            let (service, method) = req.method().unwrap_or_default();
            let echoed = RemoteMethodPb {
                service_name: format!("{}#{}", service, req.header.call_id),
                method_name: format!("{}#{:?}", method, req.header.timeout_millis),
            };
            Reply::message(&echoed)
        });
        let messenger = connect(&dialer, &endpoint).await.with_timeout_millis(1500);

        let first: RemoteMethodPb = send_message(&messenger, SERVICE, "Inspect", &RemoteMethodPb::default())
            .await
            .unwrap();
        let second: RemoteMethodPb = send_message(&messenger, SERVICE, "Inspect", &RemoteMethodPb::default())
            .await
            .unwrap();

        assert_eq!(first.service_name, format!("{}#1", SERVICE));
        assert_eq!(first.method_name, "Inspect#Some(1500)");
        assert_eq!(second.service_name, format!("{}#2", SERVICE));
    }

    #[tokio::test]
    async fn test_empty_response_body() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |_| Reply::Empty);
        let messenger = connect(&dialer, &endpoint).await;

        let body = messenger
            .send_raw(SERVICE, "Void", Bytes::new())
            .await
            .unwrap();
        assert!(body.is_empty());

        let decoded: RemoteMethodPb = send_message(&messenger, SERVICE, "Void", &RemoteMethodPb::default())
            .await
            .unwrap();
        assert_eq!(decoded, RemoteMethodPb::default());
    }

    #[tokio::test]
    async fn test_remote_error() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |_| {
            Reply::Error(ErrorStatusPb {
                message: "no such method".to_string(),
                code: Some(RpcErrorCode::ErrorNoSuchMethod as i32),
            })
        });
        let messenger = connect(&dialer, &endpoint).await;

        let err = messenger
            .send_raw(SERVICE, "Missing", Bytes::new())
            .await
            .unwrap_err();
        match err {
            SessionError::Remote(rpc) => {
                assert_eq!(rpc.code, RpcErrorCode::ErrorNoSuchMethod);
                assert_eq!(rpc.message, "no such method");
                assert!(!rpc.is_fatal());
            }
            other => panic!("expected remote error, got {:?}", other),
        }

        // The session stays usable after an application error
        assert!(messenger.send_raw(SERVICE, "Missing", Bytes::new()).await.is_err());
        assert!(!messenger.session().is_closed().await);
    }

    #[tokio::test]
    async fn test_call_id_mismatch() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |req| {
            let frame = ResponseFrame::success(req.header.call_id + 100, Bytes::new());
            Reply::Raw(frame.encode_payload())
        });
        let messenger = connect(&dialer, &endpoint).await;

        let err = messenger
            .send_raw(SERVICE, "Echo", Bytes::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("unknown call ID in response"));
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::CallIdMismatch {
                expected: 1,
                actual: 101
            })
        ));
        assert!(messenger.session().is_closed().await);
    }

    #[tokio::test]
    async fn test_keepalive_frames_skipped() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |req| Reply::Message(req.body.clone()));
        dialer.set_keepalives_before_reply(&endpoint, 3);
        let messenger = connect(&dialer, &endpoint).await;

        let body = messenger
            .send_raw(SERVICE, "Echo", Bytes::from_static(b"\x0a\x01x"))
            .await
            .unwrap();
        assert_eq!(body, Bytes::from_static(b"\x0a\x01x"));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |_| Reply::Message(Bytes::from(vec![7u8; 256])));
        let messenger = connect(&dialer, &endpoint).await.with_max_frame_size(64);

        let err = messenger
            .send_raw(SERVICE, "Big", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::Wire(WireError::Size(261)))
        ));

        // The unread body must not be taken for the next frame
        assert!(messenger.session().is_closed().await);
        let err = messenger
            .send_raw(SERVICE, "Small", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Closed(ref e) if *e == endpoint));

        dialer.wait_idle(&endpoint).await;
        assert_eq!(dialer.active_connections(&endpoint), 0);
    }

    #[tokio::test]
    async fn test_cancelled_call_never_misroutes_responses() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |req| {
            Reply::Delayed(
                Duration::from_millis(200),
                Box::new(Reply::Message(req.body.clone())),
            )
        });
        let messenger = connect(&dialer, &endpoint).await;

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            messenger.send_raw(SERVICE, "Echo", Bytes::from_static(b"\x0a\x01a")),
        )
        .await;
        assert!(cancelled.is_err());

        let err = messenger
            .send_raw(SERVICE, "Echo", Bytes::from_static(b"\x0a\x01b"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Desynced(ref e) if *e == endpoint));

        for _ in 0..3 {
            let err = messenger
                .send_raw(SERVICE, "Echo", Bytes::new())
                .await
                .unwrap_err();
            assert!(matches!(err, SessionError::Closed(_)));
        }
        assert!(messenger.session().is_closed().await);
    }

    #[tokio::test]
    async fn test_truncated_frame_closes_session() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |_| Reply::Raw(Bytes::from_static(b"\xff")));
        let messenger = connect(&dialer, &endpoint).await;

        let err = messenger
            .send_raw(SERVICE, "Echo", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Protocol(ProtocolError::Wire(_))));
        assert!(messenger.session().is_closed().await);
    }

    #[tokio::test]
    async fn test_peer_hangup_mid_call() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |_| Reply::Hangup);
        let messenger = connect(&dialer, &endpoint).await;

        let err = messenger
            .send_raw(SERVICE, "Echo", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::FrameLength { call_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_calls_serialized() {
        let endpoint = Endpoint::new("ts-1", 9100);
        let dialer = MemoryDialer::new();
        dialer.register(endpoint.clone(), |req| Reply::Message(req.body.clone()));
        let messenger = Arc::new(connect(&dialer, &endpoint).await);

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let messenger = messenger.clone();
            handles.push(tokio::spawn(async move {
                let body = Bytes::from(vec![i; usize::from(i) + 1]);
                let response = messenger.send_raw(SERVICE, "Echo", body.clone()).await.unwrap();
                assert_eq!(response, body);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(messenger.session().lock().await.generate_call_id().unwrap(), 17);
        assert!(!messenger.session().is_closed().await);
    }
}
