//! Client error types.

use crate::pb::MasterErrorCode;
use thiserror::Error;
use uuid::Uuid;
use yb_session::{ProtocolError, SessionError, TlsConfigError};
use yb_wire::{Endpoint, EndpointError};

/// Errors raised by host and cluster operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport, framing or remote RPC failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// TLS material could not be loaded
    #[error(transparent)]
    Tls(#[from] TlsConfigError),

    /// No seed answered as the master leader
    #[error("could not connect to master leader")]
    NoLeader,

    /// The UUID is not in the last tablet server listing
    #[error("tablet server {0} not found in the cluster topology")]
    UnknownUuid(Uuid),

    /// A server reported a UUID that does not parse
    #[error("invalid server UUID {raw:?}: {source}")]
    InvalidUuid {
        /// Reported bytes, lossily decoded
        raw: String,
        /// Parse failure
        #[source]
        source: uuid::Error,
    },

    /// The server registered no usable RPC address
    #[error("tablet server {0} has no RPC address")]
    NoRpcAddress(Uuid),

    /// A master call returned an error in its response
    #[error("{method} returned error: {code:?}: {message}")]
    Master {
        /// Method called
        method: &'static str,
        /// Master error class
        code: MasterErrorCode,
        /// Status message
        message: String,
    },

    /// A server call returned an error status in its response
    #[error("{method} returned error: {message}")]
    Server {
        /// Method called
        method: &'static str,
        /// Status message
        message: String,
    },

    /// GetStatus returned no status
    #[error("{0} did not report its status")]
    MissingStatus(Endpoint),

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] EndpointError),
}

/// Coarse classification of a [`ClientError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The node could not be dialed; callers batching over nodes may skip it
    Dial,
    /// Preamble or liveness probe failure while connecting
    Handshake,
    /// Framing or decoding failure on a call
    Protocol,
    /// Certificate material problem
    TlsConfig,
    /// The server reported an error
    Application,
    /// Leader or node lookup failure
    Topology,
    /// Bad configuration
    Config,
    /// I/O failure on an established connection
    Io,
}

impl ClientError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Session(e) => session_kind(e),
            ClientError::Tls(_) => ErrorKind::TlsConfig,
            ClientError::NoLeader
            | ClientError::UnknownUuid(_)
            | ClientError::InvalidUuid { .. }
            | ClientError::NoRpcAddress(_) => ErrorKind::Topology,
            ClientError::Master { .. } | ClientError::Server { .. } => ErrorKind::Application,
            ClientError::MissingStatus(_) => ErrorKind::Protocol,
            ClientError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether this is a benign per-node dial failure
    pub fn is_dial(&self) -> bool {
        self.kind() == ErrorKind::Dial
    }
}

fn session_kind(err: &SessionError) -> ErrorKind {
    match err {
        SessionError::Dial { .. } | SessionError::DialTimeout { .. } => ErrorKind::Dial,
        SessionError::Handshake(_) => ErrorKind::Handshake,
        SessionError::Probe { source, .. } => match source.as_ref() {
            SessionError::Remote(_) => ErrorKind::Application,
            _ => ErrorKind::Handshake,
        },
        SessionError::Protocol(ProtocolError::FrameLength { .. }) => ErrorKind::Io,
        SessionError::Protocol(_) => ErrorKind::Protocol,
        SessionError::Remote(_) => ErrorKind::Application,
        SessionError::Io(_) | SessionError::Closed(_) | SessionError::Desynced(_) => {
            ErrorKind::Io
        }
    }
}
