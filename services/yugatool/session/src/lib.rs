//! TCP/TLS dialers, connection preamble, call sessions and the Messenger for yugatool.
//!
//! This crate provides the transport layer used to talk to cluster nodes:
//! opening plain or TLS streams, writing the connection preamble, owning one
//! connection per node behind an exclusion lock, and exchanging framed
//! request/response pairs correlated by call ID.
//!
//! ## Features
//!
//! - **Dialers**: plain TCP and TLS (rustls) with a connect timeout
//! - **Trust configuration**: CA bundle, client identity, verification bypass
//! - **Sessions**: one call in flight per connection, call-ID generation
//! - **Messenger**: the seam typed service stubs are generated on
//! - **Testing** (feature `testing`): in-memory dialer and fake servers
//!
//! ## Example
//!
//! ```rust,no_run
//! use yb_session::{send_message, NetDialer, NoProbe, Session, SessionMessenger};
//! use yb_wire::{Endpoint, RemoteMethodPb};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), yb_session::SessionError> {
//! let endpoint = Endpoint::parse("127.0.0.1", yb_wire::DEFAULT_TSERVER_PORT).unwrap();
//! let dialer = NetDialer::new(Duration::from_secs(5));
//! let session = Session::connect(&endpoint, &dialer, &NoProbe).await?;
//! let messenger = SessionMessenger::new(session);
//!
//! let _reply: RemoteMethodPb =
//!     send_message(&messenger, "yb.server.GenericService", "Ping", &RemoteMethodPb::default())
//!         .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dial;
pub mod error;
pub mod fs;
pub mod handshake;
pub mod messenger;
pub mod session;
pub mod tls;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use dial::{select_dialer, ConfiguredDialer, Dialer, NetDialer, TlsDialer, DEFAULT_DIAL_TIMEOUT};
pub use error::{ProtocolError, RpcError, SessionError};
pub use fs::{Filesystem, MemoryFilesystem, OsFilesystem};
pub use messenger::{send_message, Messenger, SessionMessenger};
pub use session::{LivenessProbe, NoProbe, Session, SessionGuard};
pub use tls::{build_client_config, has_tls, TlsConfigError, TrustConfig};
pub use transport::IoStream;
