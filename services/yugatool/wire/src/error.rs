//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// A length varint could not be decoded
    #[error("varint corruption")]
    VarintCorruption,

    /// A length prefix points past the end of the frame
    #[error("truncated {section}: need {needed} bytes, have {available}")]
    Truncated {
        /// Which part of the frame was being read
        section: &'static str,
        /// Bytes announced by the length prefix
        needed: usize,
        /// Bytes left in the frame
        available: usize,
    },

    /// Size limit exceeded
    #[error("frame of {0} bytes exceeds size limit")]
    Size(usize),

    /// A protobuf section failed to decode
    #[error("failed to decode {section}: {source}")]
    Decode {
        /// Which part of the frame was being decoded
        section: &'static str,
        /// Underlying prost error
        #[source]
        source: prost::DecodeError,
    },

    /// A request frame carried no remote method
    #[error("request header has no remote method")]
    MissingMethod,
}
