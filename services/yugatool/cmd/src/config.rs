//! Configuration handling for yugatool.
//!
//! Settings come from an optional YAML file, then `YUGATOOL_*` environment
//! variables, then command line flags; later sources win.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use yb_client::UniverseConfig;
use yb_session::{has_tls, OsFilesystem, TrustConfig, DEFAULT_DIAL_TIMEOUT};
use yb_wire::{parse_endpoint_list, Endpoint, DEFAULT_MASTER_PORT, DEFAULT_TIMEOUT_MILLIS};

/// Tool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Comma-separated master addresses
    pub master_addresses: Option<String>,
    /// Connect timeout, e.g. `10s`
    pub dial_timeout: Option<String>,
    /// Advisory timeout sent with every request
    pub rpc_timeout_millis: Option<u32>,
    /// TLS settings
    pub tls: TlsSettings,
}

/// TLS section of the configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// CA bundle used to verify servers
    pub cacert: Option<String>,
    /// Client certificate
    pub client_cert: Option<String>,
    /// Client private key
    pub client_key: Option<String>,
    /// Skip server certificate verification
    pub skip_host_verification: bool,
}

impl ToolConfig {
    /// Load the YAML file at `config_path`
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply `YUGATOOL_*` environment variable overrides
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(masters) = lookup("YUGATOOL_MASTER_ADDRESSES") {
            info!("Master addresses overridden by environment: {}", masters);
            self.master_addresses = Some(masters);
        }

        if let Some(timeout) = lookup("YUGATOOL_DIAL_TIMEOUT") {
            info!("Dial timeout overridden by environment: {}", timeout);
            self.dial_timeout = Some(timeout);
        }

        if let Some(path) = lookup("YUGATOOL_CACERT") {
            self.tls.cacert = Some(path);
        }
        if let Some(path) = lookup("YUGATOOL_CLIENT_CERT") {
            self.tls.client_cert = Some(path);
        }
        if let Some(path) = lookup("YUGATOOL_CLIENT_KEY") {
            self.tls.client_key = Some(path);
        }

        if let Some(skip) = lookup("YUGATOOL_SKIP_HOST_VERIFICATION") {
            self.tls.skip_host_verification = parse_bool(&skip)
                .with_context(|| format!("invalid YUGATOOL_SKIP_HOST_VERIFICATION value {:?}", skip))?;
        }

        Ok(())
    }

    /// Parsed master list
    pub fn masters(&self) -> Result<Vec<Endpoint>> {
        let list = self
            .master_addresses
            .as_deref()
            .context("no master addresses configured (use --master-addresses or YUGATOOL_MASTER_ADDRESSES)")?;
        parse_endpoint_list(list, DEFAULT_MASTER_PORT)
            .with_context(|| format!("invalid master address list {:?}", list))
    }

    /// Parsed connect timeout
    pub fn dial_timeout(&self) -> Result<Duration> {
        match &self.dial_timeout {
            Some(raw) => humantime::parse_duration(raw)
                .with_context(|| format!("invalid dial timeout {:?}", raw)),
            None => Ok(DEFAULT_DIAL_TIMEOUT),
        }
    }

    /// Trust settings, or `None` when no TLS option is set
    pub fn trust(&self) -> Option<TrustConfig> {
        let trust = TrustConfig {
            skip_host_verification: self.tls.skip_host_verification,
            ca_cert_path: self.tls.cacert.clone().unwrap_or_default(),
            cert_path: self.tls.client_cert.clone().unwrap_or_default(),
            key_path: self.tls.client_key.clone().unwrap_or_default(),
        };
        has_tls(Some(&trust)).then_some(trust)
    }

    /// Connection settings for `masters`
    pub fn universe_config(&self, masters: Vec<Endpoint>) -> Result<UniverseConfig> {
        let mut config = UniverseConfig::new(masters)
            .with_dial_timeout(self.dial_timeout()?)
            .with_rpc_timeout_millis(self.rpc_timeout_millis.unwrap_or(DEFAULT_TIMEOUT_MILLIS))
            .with_filesystem(Arc::new(OsFilesystem));
        if let Some(trust) = self.trust() {
            config = config.with_trust(trust);
        }
        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
