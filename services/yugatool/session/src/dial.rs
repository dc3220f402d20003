//! Dialers that open raw byte streams to cluster nodes.

use crate::error::SessionError;
use crate::fs::Filesystem;
use crate::tls::{build_client_config, TlsConfigError, TrustConfig};
use crate::transport::{connect_tcp, IoStream};
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::TlsConnector;
use tracing::debug;
use yb_wire::Endpoint;

/// Default connect timeout
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens a duplex byte stream to an endpoint
#[async_trait]
pub trait Dialer: Send + Sync + fmt::Debug {
    /// Connect to `endpoint`
    async fn dial(&self, endpoint: &Endpoint) -> Result<IoStream, SessionError>;
}

/// Plain TCP dialer
#[derive(Debug, Clone)]
pub struct NetDialer {
    timeout: Duration,
}

impl NetDialer {
    /// Create a dialer bounding each connect by `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Connect timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for NetDialer {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT)
    }
}

#[async_trait]
impl Dialer for NetDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<IoStream, SessionError> {
        let stream = bounded(endpoint, self.timeout, connect_tcp(endpoint)).await?;
        debug!(%endpoint, "tcp connection established");
        Ok(IoStream::Plain(stream))
    }
}

/// TLS dialer; the TLS handshake counts against the connect timeout
#[derive(Clone)]
pub struct TlsDialer {
    timeout: Duration,
    connector: TlsConnector,
}

impl TlsDialer {
    /// Create a TLS dialer from a rustls client configuration
    pub fn new(timeout: Duration, config: Arc<rustls::ClientConfig>) -> Self {
        Self {
            timeout,
            connector: TlsConnector::from(config),
        }
    }

    /// Connect timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for TlsDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsDialer")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<IoStream, SessionError> {
        let connector = self.connector.clone();
        let stream = bounded(endpoint, self.timeout, async move {
            let tcp = connect_tcp(endpoint).await?;
            let server_name = ServerName::try_from(endpoint.host.clone())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
            connector.connect(server_name, tcp).await
        })
        .await?;
        debug!(%endpoint, "tls connection established");
        Ok(IoStream::Tls(Box::new(stream)))
    }
}

async fn bounded<T, F>(endpoint: &Endpoint, timeout: Duration, connect: F) -> Result<T, SessionError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(SessionError::Dial {
            endpoint: endpoint.clone(),
            source,
        }),
        Err(_) => Err(SessionError::DialTimeout {
            endpoint: endpoint.clone(),
            timeout,
        }),
    }
}

/// The dialer picked from a trust configuration
#[derive(Debug, Clone)]
pub enum ConfiguredDialer {
    /// Plaintext
    Net(NetDialer),
    /// TLS
    Tls(TlsDialer),
}

impl ConfiguredDialer {
    /// Whether connections are TLS protected
    pub fn is_tls(&self) -> bool {
        matches!(self, ConfiguredDialer::Tls(_))
    }
}

#[async_trait]
impl Dialer for ConfiguredDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<IoStream, SessionError> {
        match self {
            ConfiguredDialer::Net(dialer) => dialer.dial(endpoint).await,
            ConfiguredDialer::Tls(dialer) => dialer.dial(endpoint).await,
        }
    }
}

/// Pick a plaintext or TLS dialer for `trust`
pub fn select_dialer(
    trust: Option<&TrustConfig>,
    timeout: Duration,
    fs: &dyn Filesystem,
) -> Result<ConfiguredDialer, TlsConfigError> {
    match trust {
        Some(trust) if trust.has_tls() => {
            let config = build_client_config(trust, fs)?;
            Ok(ConfiguredDialer::Tls(TlsDialer::new(timeout, Arc::new(config))))
        }
        _ => Ok(ConfiguredDialer::Net(NetDialer::new(timeout))),
    }
}
