//! Messages shared by several services.

use yb_wire::Endpoint;

/// Host and port of a server address
#[derive(Clone, PartialEq, prost::Message)]
pub struct HostPortPb {
    /// Host name or IP literal
    #[prost(string, required, tag = "1")]
    pub host: String,
    /// Port
    #[prost(uint32, required, tag = "2")]
    pub port: u32,
}

impl HostPortPb {
    /// Convert to an [`Endpoint`], rejecting ports outside the u16 range
    pub fn to_endpoint(&self) -> Option<Endpoint> {
        let port = u16::try_from(self.port).ok()?;
        Some(Endpoint::new(self.host.clone(), port))
    }
}

impl From<&Endpoint> for HostPortPb {
    fn from(endpoint: &Endpoint) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: u32::from(endpoint.port),
        }
    }
}

/// Placement of a server
#[derive(Clone, PartialEq, prost::Message)]
pub struct CloudInfoPb {
    /// Cloud provider
    #[prost(string, optional, tag = "1")]
    pub placement_cloud: Option<String>,
    /// Region
    #[prost(string, optional, tag = "2")]
    pub placement_region: Option<String>,
    /// Availability zone
    #[prost(string, optional, tag = "3")]
    pub placement_zone: Option<String>,
}

/// Generic status carried in error fields
#[derive(Clone, PartialEq, prost::Message)]
pub struct AppStatusPb {
    /// Status code
    #[prost(int32, required, tag = "1")]
    pub code: i32,
    /// Description
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
    /// errno, when the status came from a system call
    #[prost(int32, optional, tag = "4")]
    pub posix_code: Option<i32>,
}

/// Identity of one running server process
#[derive(Clone, PartialEq, prost::Message)]
pub struct NodeInstancePb {
    /// Permanent UUID of the server, as ASCII hex
    #[prost(bytes = "vec", required, tag = "1")]
    pub permanent_uuid: Vec<u8>,
    /// Sequence number incremented on every restart
    #[prost(int64, required, tag = "2")]
    pub instance_seqno: i64,
    /// Process start time
    #[prost(fixed64, optional, tag = "3")]
    pub start_time_us: Option<u64>,
}

/// Addresses and placement a server registered with
#[derive(Clone, PartialEq, prost::Message)]
pub struct ServerRegistrationPb {
    /// RPC addresses on the private network
    #[prost(message, repeated, tag = "1")]
    pub private_rpc_addresses: Vec<HostPortPb>,
    /// Web UI addresses
    #[prost(message, repeated, tag = "2")]
    pub http_addresses: Vec<HostPortPb>,
    /// Placement
    #[prost(message, optional, tag = "3")]
    pub cloud_info: Option<CloudInfoPb>,
    /// Placement UUID of a read replica cluster
    #[prost(bytes = "vec", optional, tag = "4")]
    pub placement_uuid: Option<Vec<u8>>,
    /// RPC addresses reachable from outside the private network
    #[prost(message, repeated, tag = "5")]
    pub broadcast_addresses: Vec<HostPortPb>,
}
