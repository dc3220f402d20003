//! Basic usage example for the yugatool wire protocol.

use bytes::Bytes;
use yb_wire::{
    decode_frame_len, encode_frame_len, Endpoint, ErrorStatusPb, RequestFrame, ResponseFrame,
    RpcErrorCode, DEFAULT_TIMEOUT_MILLIS, DEFAULT_TSERVER_PORT, FRAME_LEN_SIZE, HELLO,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== YB Wire Protocol Example ===\n");

    // 1. Parse an endpoint
    let endpoint = Endpoint::parse("[::1]", DEFAULT_TSERVER_PORT)?;
    println!("1. Target endpoint: {}", endpoint);
    println!("   Connection preamble: {:02x?}", HELLO);

    // 2. Encode a request frame
    println!("\n2. Encoding a GenericService.Ping request...");
    let request = RequestFrame::new(1, "yb.server.GenericService", "Ping", DEFAULT_TIMEOUT_MILLIS, Bytes::new());
    let payload = request.encode_payload();
    let prefix = encode_frame_len(payload.len())?;
    println!("   Length prefix: {:02x?}", prefix);
    println!("   Payload: {} bytes", payload.len());

    // 3. Decode it back, as a server would
    println!("\n3. Decoding the request...");
    let len = decode_frame_len(prefix).unwrap_or(0) as usize;
    let decoded = RequestFrame::decode_payload(payload.slice(..len))?;
    if let Some((service, method)) = decoded.method() {
        println!("   Call {} -> {}.{}", decoded.header.call_id, service, method);
    }

    // 4. Void and error responses
    println!("\n4. Responses...");
    let void = ResponseFrame::empty(1).encode_payload();
    let void = ResponseFrame::decode_payload(void)?;
    println!("   Void response has body: {}", void.body.is_some());

    let status = ErrorStatusPb {
        message: "service unavailable".to_string(),
        code: Some(RpcErrorCode::ErrorNoSuchService as i32),
    };
    let error = ResponseFrame::decode_payload(ResponseFrame::error(2, &status).encode_payload())?;
    let status = error.error_status()?;
    println!(
        "   Error response: {:?} {} (fatal: {})",
        status.code(),
        status.message,
        status.code().is_fatal()
    );

    println!("\n   Frames carry a {}-byte big-endian length prefix.", FRAME_LEN_SIZE);
    println!("\n=== Example completed successfully ===");
    Ok(())
}
