//! Wire protocol framing, RPC headers, and endpoint parsing for yugatool.
//!
//! This crate provides the low-level wire protocol used to talk to cluster
//! masters and tablet servers: the connection preamble, request/response
//! headers encoded as protocol buffers, and the length-delimited frame
//! layout. It performs no I/O.
//!
//! ## Wire Format
//!
//! ```text
//! connection preamble: 'Y' 'B' 0x01
//!
//! +----------------------+------------------------------------+
//! | u32 frame_len (BE)   | length of bytes that follow        |
//! +----------------------+------------------------------------+
//! | varint hdr_len       | length of the encoded header       |
//! +----------------------+------------------------------------+
//! | header (protobuf)    | RequestHeader / ResponseHeader     |
//! +----------------------+------------------------------------+
//! | varint body_len      | absent for void responses          |
//! +----------------------+------------------------------------+
//! | body (protobuf)      | request, response or ErrorStatusPb |
//! +----------------------+------------------------------------+
//! ```
//!
//! A frame length of zero is an empty keep-alive frame and carries nothing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod endpoint;
pub mod error;
pub mod frame;
pub mod header;

// Re-export main types
pub use endpoint::{
    is_basic_ipv6, parse_endpoint_list, Endpoint, EndpointError, DEFAULT_MASTER_PORT,
    DEFAULT_TSERVER_PORT, DEFAULT_YCQL_PORT, DEFAULT_YSQL_PORT,
};
pub use error::WireError;
pub use frame::{
    decode_frame_len, encode_frame_len, RequestFrame, ResponseFrame, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_TIMEOUT_MILLIS, FRAME_LEN_SIZE, HELLO,
};
pub use header::{ErrorStatusPb, RemoteMethodPb, RequestHeader, ResponseHeader, RpcErrorCode};
