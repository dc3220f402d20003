//! Connection settings for one cluster.

use crate::error::ClientError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use yb_session::{select_dialer, Dialer, Filesystem, OsFilesystem, TrustConfig, DEFAULT_DIAL_TIMEOUT};
use yb_wire::{parse_endpoint_list, Endpoint, DEFAULT_MASTER_PORT, DEFAULT_TIMEOUT_MILLIS};

/// Everything needed to reach a cluster
#[derive(Clone)]
pub struct UniverseConfig {
    /// Seed master addresses, tried in order
    pub masters: Vec<Endpoint>,
    /// Per-connect timeout
    pub dial_timeout: Duration,
    /// Advisory timeout sent with every request
    pub rpc_timeout_millis: u32,
    /// TLS settings; `None` means plaintext
    pub trust: Option<TrustConfig>,
    /// Where certificate material is read from
    pub fs: Arc<dyn Filesystem>,
    dialer: Option<Arc<dyn Dialer>>,
}

impl UniverseConfig {
    /// Config for `masters` with default timeouts and no TLS
    pub fn new(masters: Vec<Endpoint>) -> Self {
        Self {
            masters,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            rpc_timeout_millis: DEFAULT_TIMEOUT_MILLIS,
            trust: None,
            fs: Arc::new(OsFilesystem),
            dialer: None,
        }
    }

    /// Parse a comma-separated master list (default port 7100)
    pub fn from_master_list(list: &str) -> Result<Self, ClientError> {
        Ok(Self::new(parse_endpoint_list(list, DEFAULT_MASTER_PORT)?))
    }

    /// Set the connect timeout
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the advisory RPC timeout
    pub fn with_rpc_timeout_millis(mut self, timeout_millis: u32) -> Self {
        self.rpc_timeout_millis = timeout_millis;
        self
    }

    /// Set TLS trust settings
    pub fn with_trust(mut self, trust: TrustConfig) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Read certificate material through `fs`
    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Use `dialer` instead of one built from the trust settings
    pub fn override_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// The dialer every connection of this config goes through.
    ///
    /// TLS material is loaded here, before any network I/O.
    pub fn dialer(&self) -> Result<Arc<dyn Dialer>, ClientError> {
        if let Some(dialer) = &self.dialer {
            return Ok(dialer.clone());
        }
        let dialer = select_dialer(self.trust.as_ref(), self.dial_timeout, self.fs.as_ref())?;
        Ok(Arc::new(dialer))
    }
}

impl fmt::Debug for UniverseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniverseConfig")
            .field("masters", &self.masters)
            .field("dial_timeout", &self.dial_timeout)
            .field("rpc_timeout_millis", &self.rpc_timeout_millis)
            .field("trust", &self.trust)
            .field("dialer_override", &self.dialer.is_some())
            .finish()
    }
}
