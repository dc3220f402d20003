//! Message framing for the wire protocol.
//!
//! A frame payload is `[varint hdr_len][header][varint body_len][body]`.
//! On the wire it is preceded by a 4-byte big-endian length; this module
//! builds and parses the payload and leaves the length prefix I/O to the
//! session layer.

use crate::error::WireError;
use crate::header::{ErrorStatusPb, RequestHeader, ResponseHeader};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use tracing::trace;

/// Connection preamble written right after connect
pub const HELLO: [u8; 3] = [b'Y', b'B', 0x01];

/// Size of the big-endian length prefix in front of every frame
pub const FRAME_LEN_SIZE: usize = 4;

/// Advisory timeout sent with each request
pub const DEFAULT_TIMEOUT_MILLIS: u32 = 3000;

/// Largest frame payload accepted from a peer (64 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Maximum encoded size of a u32 varint
const MAX_VARINT_LEN: usize = 5;

/// Encode the 4-byte length prefix for a payload of `len` bytes
pub fn encode_frame_len(len: usize) -> Result<[u8; FRAME_LEN_SIZE], WireError> {
    let len = u32::try_from(len).map_err(|_| WireError::Size(len))?;
    Ok(len.to_be_bytes())
}

/// Decode a 4-byte length prefix. `None` marks an empty keep-alive frame.
pub fn decode_frame_len(prefix: [u8; FRAME_LEN_SIZE]) -> Option<u32> {
    match u32::from_be_bytes(prefix) {
        0 => None,
        len => Some(len),
    }
}

/// A request as carried on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    /// Request header
    pub header: RequestHeader,
    /// Encoded request message
    pub body: Bytes,
}

impl RequestFrame {
    /// Build a request frame for `service.method`
    pub fn new(call_id: i32, service: &str, method: &str, timeout_millis: u32, body: Bytes) -> Self {
        Self {
            header: RequestHeader::new(call_id, service, method, timeout_millis),
            body,
        }
    }

    /// Service and method names, if present
    pub fn method(&self) -> Option<(&str, &str)> {
        self.header
            .remote_method
            .as_ref()
            .map(|m| (m.service_name.as_str(), m.method_name.as_str()))
    }

    /// Encode the payload (without the 4-byte length prefix)
    pub fn encode_payload(&self) -> Bytes {
        encode_sections(&self.header, Some(&self.body))
    }

    /// Decode a payload read off the wire
    pub fn decode_payload(mut buf: Bytes) -> Result<Self, WireError> {
        let header_bytes = split_delimited(&mut buf, "request header")?;
        let header = RequestHeader::decode(header_bytes).map_err(|source| WireError::Decode {
            section: "request header",
            source,
        })?;
        if header.remote_method.is_none() {
            return Err(WireError::MissingMethod);
        }
        let body = if buf.has_remaining() {
            split_delimited(&mut buf, "request body")?
        } else {
            Bytes::new()
        };
        Ok(Self { header, body })
    }
}

/// A response as carried on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    /// Response header
    pub header: ResponseHeader,
    /// Encoded response (or error status) message; `None` for a void reply
    pub body: Option<Bytes>,
}

impl ResponseFrame {
    /// Successful response carrying `body`
    pub fn success(call_id: i32, body: Bytes) -> Self {
        Self {
            header: ResponseHeader {
                call_id,
                is_error: None,
                sidecar_offsets: Vec::new(),
            },
            body: Some(body),
        }
    }

    /// Successful response with no body at all
    pub fn empty(call_id: i32) -> Self {
        Self {
            header: ResponseHeader {
                call_id,
                is_error: None,
                sidecar_offsets: Vec::new(),
            },
            body: None,
        }
    }

    /// Error response carrying an encoded [`ErrorStatusPb`]
    pub fn error(call_id: i32, status: &ErrorStatusPb) -> Self {
        Self {
            header: ResponseHeader {
                call_id,
                is_error: Some(true),
                sidecar_offsets: Vec::new(),
            },
            body: Some(Bytes::from(status.encode_to_vec())),
        }
    }

    /// Whether the body is an error status
    pub fn is_error(&self) -> bool {
        self.header.is_error()
    }

    /// Decode the body as an [`ErrorStatusPb`]
    pub fn error_status(&self) -> Result<ErrorStatusPb, WireError> {
        let body = self.body.clone().unwrap_or_default();
        ErrorStatusPb::decode(body).map_err(|source| WireError::Decode {
            section: "error status",
            source,
        })
    }

    /// Encode the payload (without the 4-byte length prefix)
    pub fn encode_payload(&self) -> Bytes {
        encode_sections(&self.header, self.body.as_ref())
    }

    /// Decode a payload read off the wire.
    ///
    /// Nothing after the header means an empty body. Bytes after the
    /// delimited body belong to sidecars and are not interpreted.
    pub fn decode_payload(mut buf: Bytes) -> Result<Self, WireError> {
        let header_bytes = split_delimited(&mut buf, "response header")?;
        let header = ResponseHeader::decode(header_bytes).map_err(|source| WireError::Decode {
            section: "response header",
            source,
        })?;

        if !buf.has_remaining() {
            return Ok(Self { header, body: None });
        }

        let body = split_delimited(&mut buf, "response body")?;
        if buf.has_remaining() {
            trace!(
                call_id = header.call_id,
                trailing = buf.remaining(),
                sidecars = header.sidecar_offsets.len(),
                "ignoring bytes after response body"
            );
        }
        Ok(Self {
            header,
            body: Some(body),
        })
    }
}

fn encode_sections<H: Message>(header: &H, body: Option<&Bytes>) -> Bytes {
    let header_len = header.encoded_len();
    let body_len = body.map(|b| b.len() + MAX_VARINT_LEN).unwrap_or(0);
    let mut buf = BytesMut::with_capacity(MAX_VARINT_LEN + header_len + body_len);

    prost::encoding::encode_varint(header_len as u64, &mut buf);
    // BytesMut grows on demand, encoding cannot run out of space
    let _ = header.encode(&mut buf);

    if let Some(body) = body {
        prost::encoding::encode_varint(body.len() as u64, &mut buf);
        buf.put_slice(body);
    }
    buf.freeze()
}

fn split_delimited(buf: &mut Bytes, section: &'static str) -> Result<Bytes, WireError> {
    let len = prost::encoding::decode_varint(buf).map_err(|_| WireError::VarintCorruption)?;
    let len = usize::try_from(len).map_err(|_| WireError::VarintCorruption)?;
    if buf.remaining() < len {
        return Err(WireError::Truncated {
            section,
            needed: len,
            available: buf.remaining(),
        });
    }
    Ok(buf.split_to(len))
}
