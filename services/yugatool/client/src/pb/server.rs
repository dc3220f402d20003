//! `yb.server.GenericService` messages.

use super::common::{AppStatusPb, HostPortPb, NodeInstancePb};

/// Ping request
#[derive(Clone, PartialEq, prost::Message)]
pub struct PingRequestPb {}

/// Ping response
#[derive(Clone, PartialEq, prost::Message)]
pub struct PingResponsePb {}

/// GetStatus request
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetStatusRequestPb {}

/// GetStatus response
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetStatusResponsePb {
    /// Server status
    #[prost(message, optional, tag = "1")]
    pub status: Option<ServerStatusPb>,
    /// Set when the status could not be produced
    #[prost(message, optional, tag = "2")]
    pub error: Option<AppStatusPb>,
}

/// Status a server reports about itself
#[derive(Clone, PartialEq, prost::Message)]
pub struct ServerStatusPb {
    /// Process identity
    #[prost(message, optional, tag = "1")]
    pub node_instance: Option<NodeInstancePb>,
    /// Addresses the RPC server is bound to
    #[prost(message, repeated, tag = "2")]
    pub bound_rpc_addresses: Vec<HostPortPb>,
    /// Addresses the web server is bound to
    #[prost(message, repeated, tag = "3")]
    pub bound_http_addresses: Vec<HostPortPb>,
    /// Build information
    #[prost(message, optional, tag = "4")]
    pub version_info: Option<VersionInfoPb>,
}

/// Build information of a server binary
#[derive(Clone, PartialEq, prost::Message)]
pub struct VersionInfoPb {
    /// Source revision
    #[prost(string, optional, tag = "1")]
    pub git_hash: Option<String>,
    /// Build host
    #[prost(string, optional, tag = "2")]
    pub build_hostname: Option<String>,
    /// Build time
    #[prost(string, optional, tag = "3")]
    pub build_timestamp: Option<String>,
    /// Build user
    #[prost(string, optional, tag = "4")]
    pub build_username: Option<String>,
    /// Built from a clean checkout
    #[prost(bool, optional, tag = "5")]
    pub build_clean_repo: Option<bool>,
    /// Build identifier
    #[prost(string, optional, tag = "6")]
    pub build_id: Option<String>,
    /// Build type, e.g. `RELEASE`
    #[prost(string, optional, tag = "7")]
    pub build_type: Option<String>,
    /// Release version, e.g. `2.20.1.0`
    #[prost(string, optional, tag = "8")]
    pub version_number: Option<String>,
    /// Build number within the release
    #[prost(string, optional, tag = "9")]
    pub build_number: Option<String>,
}

impl VersionInfoPb {
    /// `version-bBUILD`, or whatever parts are known
    pub fn display_version(&self) -> String {
        match (self.version_number.as_deref(), self.build_number.as_deref()) {
            (Some(version), Some(build)) => format!("{}-b{}", version, build),
            (Some(version), None) => version.to_string(),
            _ => "unknown".to_string(),
        }
    }
}

/// GetFlag request
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetFlagRequestPb {
    /// Flag name
    #[prost(string, optional, tag = "1")]
    pub flag: Option<String>,
}

/// GetFlag response
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetFlagResponsePb {
    /// Whether the flag exists
    #[prost(bool, optional, tag = "1")]
    pub valid: Option<bool>,
    /// Current value
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}
