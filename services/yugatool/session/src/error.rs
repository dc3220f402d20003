//! Session and RPC error types.

use std::time::Duration;
use thiserror::Error;
use yb_wire::{Endpoint, RpcErrorCode, WireError};

/// Errors raised while connecting or exchanging calls on a session
#[derive(Error, Debug)]
pub enum SessionError {
    /// The endpoint could not be reached
    #[error("could not dial {endpoint}: {source}")]
    Dial {
        /// Target endpoint
        endpoint: Endpoint,
        /// Underlying connect or TLS handshake failure
        #[source]
        source: std::io::Error,
    },

    /// Connecting took longer than the dial timeout
    #[error("dial {endpoint} timed out after {timeout:?}")]
    DialTimeout {
        /// Target endpoint
        endpoint: Endpoint,
        /// Configured timeout
        timeout: Duration,
    },

    /// The connection preamble could not be written
    #[error("{0}")]
    Handshake(String),

    /// The liveness probe run during connect failed
    #[error("liveness probe to {endpoint} failed: {source}")]
    Probe {
        /// Target endpoint
        endpoint: Endpoint,
        /// Probe failure
        #[source]
        source: Box<SessionError>,
    },

    /// Framing failure on a single call
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server answered with an error status
    #[error(transparent)]
    Remote(#[from] RpcError),

    /// I/O error on an established connection
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The session was already closed
    #[error("session to {0} is closed")]
    Closed(Endpoint),

    /// An earlier call was abandoned mid-exchange; the session was closed
    #[error("session to {0} lost framing after an abandoned call")]
    Desynced(Endpoint),
}

impl SessionError {
    /// Whether this error means the endpoint could not be dialed at all
    pub fn is_dial(&self) -> bool {
        matches!(self, SessionError::Dial { .. } | SessionError::DialTimeout { .. })
    }

    /// Endpoint the dial was aimed at, for dial errors
    pub fn dial_endpoint(&self) -> Option<&Endpoint> {
        match self {
            SessionError::Dial { endpoint, .. } | SessionError::DialTimeout { endpoint, .. } => {
                Some(endpoint)
            }
            _ => None,
        }
    }
}

/// Framing and correlation failures. One raised mid-exchange closes the session.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Short write of the 4-byte length prefix
    #[error("packet len not 4 bytes")]
    ShortLengthWrite,

    /// Short write of the frame payload
    #[error("request over the wire not equal to messageLen")]
    ShortFrameWrite {
        /// Bytes written
        written: usize,
        /// Bytes expected
        expected: usize,
    },

    /// The response length prefix could not be read
    #[error("invalid message len callID {call_id}: {source}")]
    FrameLength {
        /// Call waiting for the response
        call_id: i32,
        /// Read failure
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the stream in the middle of a frame
    #[error("connection closed after {read} of {expected} response bytes")]
    ShortRead {
        /// Bytes read
        read: usize,
        /// Bytes announced by the length prefix
        expected: usize,
    },

    /// The response answers a different call
    #[error("unknown call ID in response: expected {expected}, got {actual}")]
    CallIdMismatch {
        /// Outstanding call
        expected: i32,
        /// Call ID found in the response header
        actual: i32,
    },

    /// Frame content could not be decoded
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Every call ID of the session has been used
    #[error("call IDs exhausted on this session")]
    CallIdsExhausted,

    /// A response body did not decode as the expected message
    #[error("failed to decode response to {service}.{method}: {source}")]
    Decode {
        /// Service called
        service: String,
        /// Method called
        method: String,
        /// Underlying prost error
        #[source]
        source: prost::DecodeError,
    },
}

/// Error status reported by the server for one call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote error {code:?}: {message}")]
pub struct RpcError {
    /// Server-provided description
    pub message: String,
    /// Error identifier
    pub code: RpcErrorCode,
}

impl RpcError {
    /// Whether the server expects the connection to be closed
    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }
}

impl From<yb_wire::ErrorStatusPb> for RpcError {
    fn from(status: yb_wire::ErrorStatusPb) -> Self {
        let code = status.code();
        Self {
            message: status.message,
            code,
        }
    }
}
