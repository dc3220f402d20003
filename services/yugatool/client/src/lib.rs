//! Service messages, typed stubs, per-host state and cluster discovery for yugatool.
//!
//! This crate provides the layer above [`yb_session`]: the protocol buffer
//! messages of the generic and master services, typed stubs generated over
//! the [`yb_session::Messenger`] seam, [`HostState`] binding one connected
//! server to those stubs, and [`ClusterClient`] turning a list of seed
//! masters into the master leader plus a pool of tablet server connections.
//!
//! ## Example
//!
//! ```rust,no_run
//! use yb_client::{ClusterClient, UniverseConfig};
//!
//! # async fn example() -> Result<(), yb_client::ClientError> {
//! let config = UniverseConfig::from_master_list("10.0.0.1,10.0.0.2,10.0.0.3")?;
//! let cluster = ClusterClient::connect(config).await?;
//!
//! let (tservers, errors) = cluster.all_tservers().await;
//! for host in &tservers {
//!     println!("{} {}", host.endpoint(), host.uuid()?);
//! }
//! for err in errors.iter().filter(|e| !e.is_dial()) {
//!     eprintln!("{}", err);
//! }
//! cluster.close().await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod host;
pub mod pb;
pub mod service;

// Re-export main types
pub use cluster::{ClusterClient, TabletServerInfo};
pub use config::UniverseConfig;
pub use error::{ClientError, ErrorKind};
pub use host::HostState;
pub use service::{GenericPing, GenericService, MasterService};
