//! Connection preamble.
//!
//! This module implements the 3-byte hello written immediately after a
//! connection is established, before any framed traffic.

use crate::error::SessionError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;
use yb_wire::HELLO;

/// Write the connection preamble and verify it went out whole
pub async fn send_hello<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), SessionError> {
    let written = writer.write(&HELLO).await?;
    if written != HELLO.len() {
        return Err(SessionError::Handshake(format!(
            "hello did not write {} bytes",
            HELLO.len()
        )));
    }
    writer.flush().await?;
    trace!("sent connection preamble");
    Ok(())
}

/// Read and check the connection preamble (server side)
pub async fn recv_hello<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    let mut preamble = [0u8; 3];
    reader.read_exact(&mut preamble).await?;
    if preamble != HELLO {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("bad connection preamble {:02x?}", preamble),
        ));
    }
    trace!("received connection preamble");
    Ok(())
}
