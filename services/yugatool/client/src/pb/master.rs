//! `yb.master.MasterService` messages.

use super::common::{AppStatusPb, CloudInfoPb, NodeInstancePb, ServerRegistrationPb};

/// Master-level error codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MasterErrorCode {
    /// Unclassified error
    UnknownError = 1,
    /// Schema rejected
    InvalidSchema = 2,
    /// Requested object does not exist
    ObjectNotFound = 3,
    /// Object already exists
    ObjectAlreadyPresent = 4,
    /// Tablet limit reached
    TooManyTablets = 5,
    /// Catalog manager still starting
    CatalogManagerNotInitialized = 6,
    /// This master is not the leader and cannot answer
    NotTheLeader = 7,
}

/// Error returned inside master responses
#[derive(Clone, PartialEq, prost::Message)]
pub struct MasterErrorPb {
    /// Error class
    #[prost(enumeration = "MasterErrorCode", required, tag = "1")]
    pub code: i32,
    /// Underlying status
    #[prost(message, optional, tag = "2")]
    pub status: Option<AppStatusPb>,
}

impl MasterErrorPb {
    /// Status message, empty when absent
    pub fn message(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.message.as_deref())
            .unwrap_or_default()
    }
}

/// Registration of a tablet server
#[derive(Clone, PartialEq, prost::Message)]
pub struct TsRegistrationPb {
    /// Addresses and placement
    #[prost(message, optional, tag = "1")]
    pub common: Option<ServerRegistrationPb>,
}

/// ListTabletServers request
#[derive(Clone, PartialEq, prost::Message)]
pub struct ListTabletServersRequestPb {
    /// Only list servers of the primary cluster
    #[prost(bool, optional, tag = "1")]
    pub primary_only: Option<bool>,
}

/// ListTabletServers response
#[derive(Clone, PartialEq, prost::Message)]
pub struct ListTabletServersResponsePb {
    /// Set on failure
    #[prost(message, optional, tag = "1")]
    pub error: Option<MasterErrorPb>,
    /// Known tablet servers
    #[prost(message, repeated, tag = "2")]
    pub servers: Vec<TabletServerEntryPb>,
}

/// One tablet server known to the master
#[derive(Clone, PartialEq, prost::Message)]
pub struct TabletServerEntryPb {
    /// Server identity
    #[prost(message, optional, tag = "1")]
    pub instance_id: Option<NodeInstancePb>,
    /// Registered addresses
    #[prost(message, optional, tag = "2")]
    pub registration: Option<TsRegistrationPb>,
    /// Time since the last heartbeat reached the master
    #[prost(int32, optional, tag = "3")]
    pub millis_since_heartbeat: Option<i32>,
    /// Whether the master considers the server alive
    #[prost(bool, optional, tag = "4")]
    pub alive: Option<bool>,
}

impl TabletServerEntryPb {
    /// Addresses the server registered for RPC traffic
    pub fn registration(&self) -> Option<&ServerRegistrationPb> {
        self.registration.as_ref().and_then(|r| r.common.as_ref())
    }
}

/// Raft role of a master
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RaftRole {
    /// Role not reported
    UnknownRole = 7,
    /// Voting follower
    Follower = 0,
    /// Raft leader
    Leader = 1,
    /// Non-voting member catching up
    Learner = 2,
    /// Not part of the configuration
    NonParticipant = 3,
    /// Read replica
    ReadReplica = 4,
}

/// ListMasters request
#[derive(Clone, PartialEq, prost::Message)]
pub struct ListMastersRequestPb {}

/// ListMasters response
#[derive(Clone, PartialEq, prost::Message)]
pub struct ListMastersResponsePb {
    /// Masters in the Raft config
    #[prost(message, repeated, tag = "1")]
    pub masters: Vec<ServerEntryPb>,
    /// Set on failure
    #[prost(message, optional, tag = "2")]
    pub error: Option<AppStatusPb>,
}

/// One master server
#[derive(Clone, PartialEq, prost::Message)]
pub struct ServerEntryPb {
    /// Set when the master could not be reached
    #[prost(message, optional, tag = "1")]
    pub error: Option<AppStatusPb>,
    /// Server identity
    #[prost(message, optional, tag = "2")]
    pub instance_id: Option<NodeInstancePb>,
    /// Registered addresses
    #[prost(message, optional, tag = "3")]
    pub registration: Option<ServerRegistrationPb>,
    /// Raft role
    #[prost(enumeration = "RaftRole", optional, tag = "4")]
    pub role: Option<i32>,
}

/// GetMasterClusterConfig request
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMasterClusterConfigRequestPb {}

/// GetMasterClusterConfig response
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetMasterClusterConfigResponsePb {
    /// Set on failure
    #[prost(message, optional, tag = "1")]
    pub error: Option<MasterErrorPb>,
    /// Current configuration
    #[prost(message, optional, tag = "2")]
    pub cluster_config: Option<SysClusterConfigEntryPb>,
}

/// Cluster-wide configuration kept in the master catalog
#[derive(Clone, PartialEq, prost::Message)]
pub struct SysClusterConfigEntryPb {
    /// Bumped on every config change
    #[prost(int32, optional, tag = "1")]
    pub version: Option<i32>,
    /// Replica placement
    #[prost(message, optional, tag = "2")]
    pub replication_info: Option<ReplicationInfoPb>,
    /// Identity of the universe
    #[prost(string, optional, tag = "4")]
    pub cluster_uuid: Option<String>,
}

impl SysClusterConfigEntryPb {
    /// Zones the live replicas are placed in
    pub fn live_zones(&self) -> Vec<String> {
        self.replication_info
            .as_ref()
            .and_then(|r| r.live_replicas.as_ref())
            .map(|p| {
                p.placement_blocks
                    .iter()
                    .filter_map(|b| b.cloud_info.as_ref()?.placement_zone.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Replica placement policy
#[derive(Clone, PartialEq, prost::Message)]
pub struct ReplicationInfoPb {
    /// Placement of voting replicas
    #[prost(message, optional, tag = "1")]
    pub live_replicas: Option<PlacementInfoPb>,
}

/// Where and how many replicas are placed
#[derive(Clone, PartialEq, prost::Message)]
pub struct PlacementInfoPb {
    /// Replication factor
    #[prost(int32, optional, tag = "1")]
    pub num_replicas: Option<i32>,
    /// Per-zone placement
    #[prost(message, repeated, tag = "2")]
    pub placement_blocks: Vec<PlacementBlockPb>,
}

/// Minimum replica count for one placement
#[derive(Clone, PartialEq, prost::Message)]
pub struct PlacementBlockPb {
    /// Cloud, region and zone
    #[prost(message, optional, tag = "1")]
    pub cloud_info: Option<CloudInfoPb>,
    /// Replicas required in this placement
    #[prost(int32, optional, tag = "2")]
    pub min_num_replicas: Option<i32>,
}
