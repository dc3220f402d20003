//! RPC header messages exchanged in front of every request and response body.
//!
//! Field numbers follow `yb/rpc/rpc_header.proto` so the encoded bytes are
//! understood by cluster servers.

/// Fully qualified remote method
#[derive(Clone, PartialEq, prost::Message)]
pub struct RemoteMethodPb {
    /// Service name, e.g. `yb.server.GenericService`
    #[prost(string, required, tag = "1")]
    pub service_name: String,
    /// Method name, e.g. `Ping`
    #[prost(string, required, tag = "2")]
    pub method_name: String,
}

/// Header sent in front of each request body
#[derive(Clone, PartialEq, prost::Message)]
pub struct RequestHeader {
    /// Session-unique call identifier echoed back by the server
    #[prost(int32, required, tag = "1")]
    pub call_id: i32,
    /// Target method
    #[prost(message, optional, tag = "2")]
    pub remote_method: Option<RemoteMethodPb>,
    /// Advisory server-side timeout
    #[prost(uint32, optional, tag = "3")]
    pub timeout_millis: Option<u32>,
}

impl RequestHeader {
    /// Build a header for `service.method`
    pub fn new(call_id: i32, service: &str, method: &str, timeout_millis: u32) -> Self {
        Self {
            call_id,
            remote_method: Some(RemoteMethodPb {
                service_name: service.to_string(),
                method_name: method.to_string(),
            }),
            timeout_millis: Some(timeout_millis),
        }
    }
}

/// Header sent in front of each response body
#[derive(Clone, PartialEq, prost::Message)]
pub struct ResponseHeader {
    /// Call identifier of the request being answered
    #[prost(int32, required, tag = "1")]
    pub call_id: i32,
    /// When set, the body is an [`ErrorStatusPb`]
    #[prost(bool, optional, tag = "2", default = "false")]
    pub is_error: Option<bool>,
    /// Byte offsets of sidecars appended to the body
    #[prost(uint32, repeated, packed = "false", tag = "3")]
    pub sidecar_offsets: Vec<u32>,
}

/// Body of a response whose header has `is_error` set
#[derive(Clone, PartialEq, prost::Message)]
pub struct ErrorStatusPb {
    /// Human readable description
    #[prost(string, required, tag = "1")]
    pub message: String,
    /// Specific error identifier
    #[prost(enumeration = "RpcErrorCode", optional, tag = "2")]
    pub code: Option<i32>,
}

/// RPC-layer error codes.
///
/// `Error*` codes leave the connection usable; `Fatal*` codes tell the
/// client to shut the connection down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RpcErrorCode {
    /// Unknown fatal error
    FatalUnknown = 10,
    /// The application generated an error status
    ErrorApplication = 1,
    /// The specified method was not valid
    ErrorNoSuchMethod = 2,
    /// The specified service was not valid
    ErrorNoSuchService = 3,
    /// The server is overloaded
    ErrorServerTooBusy = 4,
    /// The request was not parseable or was missing required fields
    ErrorInvalidRequest = 5,
    /// The RPC server is shutting down
    FatalServerShuttingDown = 11,
    /// The server could not deserialize the request
    FatalDeserializingRequest = 13,
    /// IPC layer version mismatch
    FatalVersionMismatch = 14,
    /// Authentication failed
    FatalUnauthorized = 15,
}

impl RpcErrorCode {
    /// Whether the server expects the connection to be torn down
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            RpcErrorCode::FatalUnknown
                | RpcErrorCode::FatalServerShuttingDown
                | RpcErrorCode::FatalDeserializingRequest
                | RpcErrorCode::FatalVersionMismatch
                | RpcErrorCode::FatalUnauthorized
        )
    }
}
