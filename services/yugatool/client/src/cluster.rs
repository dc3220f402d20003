//! Cluster discovery and the per-node connection pool.
//!
//! [`ClusterClient::connect`] walks the seed masters in order until one
//! answers `ListTabletServers` as the leader. The tablet server listing it
//! returns becomes the topology snapshot; tablet servers are then dialed
//! lazily, once per UUID, when first addressed. Each UUID has its own slot,
//! so a slow node only holds up callers asking for that node.

use crate::config::UniverseConfig;
use crate::error::ClientError;
use crate::host::{parse_uuid, HostState};
use crate::pb::{
    GetMasterClusterConfigRequestPb, ListMastersRequestPb, SysClusterConfigEntryPb, ListTabletServersRequestPb, MasterErrorCode, ServerEntryPb,
    TabletServerEntryPb,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;
use yb_session::Dialer;
use yb_wire::Endpoint;

/// One tablet server from the leader's listing
#[derive(Debug, Clone)]
pub struct TabletServerInfo {
    /// Permanent UUID
    pub uuid: Uuid,
    /// Entry as returned by the master
    pub entry: TabletServerEntryPb,
}

impl TabletServerInfo {
    fn from_entry(entry: TabletServerEntryPb) -> Result<Self, ClientError> {
        let raw = entry
            .instance_id
            .as_ref()
            .map(|i| i.permanent_uuid.as_slice())
            .unwrap_or_default();
        Ok(Self {
            uuid: parse_uuid(raw)?,
            entry,
        })
    }

    /// First registered private RPC address
    pub fn rpc_address(&self) -> Option<Endpoint> {
        self.entry
            .registration()
            .and_then(|r| r.private_rpc_addresses.first())
            .and_then(|hp| hp.to_endpoint())
    }
}

/// Connection to a cluster: the master leader plus lazily dialed tablet servers
#[derive(Debug)]
pub struct ClusterClient {
    config: UniverseConfig,
    dialer: Arc<dyn Dialer>,
    leader: Arc<HostState>,
    tservers: Vec<TabletServerInfo>,
    nodes: Mutex<HashMap<Uuid, Arc<NodeSlot>>>,
}

type NodeSlot = OnceCell<Arc<HostState>>;

impl ClusterClient {
    /// Find the master leader among the configured seeds.
    ///
    /// Unreachable seeds and non-leaders are skipped. Any other master
    /// error aborts discovery.
    pub async fn connect(config: UniverseConfig) -> Result<Self, ClientError> {
        let dialer = config.dialer()?;
        let seeds = config.masters.clone();

        for seed in &seeds {
            let host = match HostState::connect(seed, dialer.as_ref(), config.rpc_timeout_millis).await {
                Ok(host) => host,
                Err(e) => {
                    debug!(master = %seed, error = %e, "unable to connect to master");
                    continue;
                }
            };

            let request = ListTabletServersRequestPb {
                primary_only: Some(false),
            };
            let response = match host.master.list_tablet_servers(&request).await {
                Ok(response) => response,
                Err(e) => {
                    close_quietly(&host).await;
                    return Err(e.into());
                }
            };

            if let Some(error) = &response.error {
                close_quietly(&host).await;
                if error.code() == MasterErrorCode::NotTheLeader {
                    debug!(master = %seed, "master is not the leader");
                    continue;
                }
                return Err(ClientError::Master {
                    method: "ListTabletServers",
                    code: error.code(),
                    message: error.message().to_string(),
                });
            }

            let tservers = match response
                .servers
                .into_iter()
                .map(TabletServerInfo::from_entry)
                .collect::<Result<Vec<_>, _>>()
            {
                Ok(tservers) => tservers,
                Err(e) => {
                    close_quietly(&host).await;
                    return Err(e);
                }
            };

            info!(leader = %seed, tservers = tservers.len(), "connected to master leader");
            return Ok(Self {
                config,
                dialer,
                leader: Arc::new(host),
                tservers,
                nodes: Mutex::new(HashMap::new()),
            });
        }

        Err(ClientError::NoLeader)
    }

    /// The master leader found during discovery
    pub fn leader(&self) -> &Arc<HostState> {
        &self.leader
    }

    /// Topology snapshot taken at discovery
    pub fn tservers(&self) -> &[TabletServerInfo] {
        &self.tservers
    }

    /// Settings this client was built from
    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    /// Connection to the tablet server `uuid`, dialing it on first use.
    ///
    /// Concurrent callers for the same UUID share one dial. A pooled host
    /// whose session has closed is dropped and dialed again.
    pub async fn get_host_by_uuid(&self, uuid: &Uuid) -> Result<Arc<HostState>, ClientError> {
        let info = self
            .tservers
            .iter()
            .find(|t| &t.uuid == uuid)
            .ok_or(ClientError::UnknownUuid(*uuid))?;
        let endpoint = info.rpc_address().ok_or(ClientError::NoRpcAddress(*uuid))?;

        let mut slot = self.slot(uuid).await;
        if let Some(stale) = slot.get().cloned() {
            if !stale.is_defunct() {
                return Ok(stale);
            }
            warn!(%uuid, endpoint = %stale.endpoint(), "pooled connection is closed, redialing");
            slot = self.evict(uuid, &slot).await;
            close_quietly(&stale).await;
        }

        let dialer = self.dialer.as_ref();
        let rpc_timeout_millis = self.config.rpc_timeout_millis;
        let endpoint = &endpoint;
        let host = slot
            .get_or_try_init(|| async move {
                debug!(%uuid, %endpoint, "resolving tablet server");
                HostState::connect(endpoint, dialer, rpc_timeout_millis)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(host.clone())
    }

    async fn slot(&self, uuid: &Uuid) -> Arc<NodeSlot> {
        self.nodes.lock().await.entry(*uuid).or_default().clone()
    }

    /// Replace `stale` with an empty slot unless another caller already did
    async fn evict(&self, uuid: &Uuid, stale: &Arc<NodeSlot>) -> Arc<NodeSlot> {
        let mut nodes = self.nodes.lock().await;
        let slot = nodes.entry(*uuid).or_default();
        if Arc::ptr_eq(slot, stale) {
            *slot = Arc::new(NodeSlot::new());
        }
        slot.clone()
    }

    /// [`ClusterClient::get_host_by_uuid`] for a UUID in its wire form
    pub async fn host_by_permanent_uuid(&self, raw: &[u8]) -> Result<Arc<HostState>, ClientError> {
        let uuid = parse_uuid(raw)?;
        self.get_host_by_uuid(&uuid).await
    }

    /// Resolve every tablet server in the snapshot.
    ///
    /// Failures are collected alongside the hosts that did connect;
    /// [`ClientError::is_dial`] tells unreachable nodes from real errors.
    pub async fn all_tservers(&self) -> (Vec<Arc<HostState>>, Vec<ClientError>) {
        let mut hosts = Vec::with_capacity(self.tservers.len());
        let mut errors = Vec::new();
        for info in &self.tservers {
            match self.get_host_by_uuid(&info.uuid).await {
                Ok(host) => hosts.push(host),
                Err(e) => errors.push(e),
            }
        }
        (hosts, errors)
    }

    /// Masters in the leader's Raft configuration
    pub async fn list_masters(&self) -> Result<Vec<ServerEntryPb>, ClientError> {
        let response = self.leader.master.list_masters(&ListMastersRequestPb {}).await?;
        if let Some(error) = response.error {
            return Err(ClientError::Server {
                method: "ListMasters",
                message: error.message.unwrap_or_default(),
            });
        }
        Ok(response.masters)
    }

    /// Cluster-wide configuration held by the leader
    pub async fn master_cluster_config(&self) -> Result<SysClusterConfigEntryPb, ClientError> {
        let response = self
            .leader
            .master
            .get_master_cluster_config(&GetMasterClusterConfigRequestPb {})
            .await?;
        if let Some(error) = response.error {
            return Err(ClientError::Master {
                method: "GetMasterClusterConfig",
                code: error.code(),
                message: error.message().to_string(),
            });
        }
        Ok(response.cluster_config.unwrap_or_default())
    }

    /// Close the leader and every pooled tablet server.
    ///
    /// All hosts are closed even when some fail; the first failure is returned.
    pub async fn close(self) -> Result<(), ClientError> {
        let mut first_error = None;
        let nodes = self.nodes.into_inner();
        let pooled = nodes.into_values().filter_map(|slot| slot.get().cloned());
        let hosts = std::iter::once(self.leader).chain(pooled);
        for host in hosts {
            if host.is_defunct() {
                debug!(endpoint = %host.endpoint(), "connection already closed");
                continue;
            }
            if let Err(e) = host.close().await {
                warn!(endpoint = %host.endpoint(), error = %e, "failed to close connection");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn close_quietly(host: &HostState) {
    if let Err(e) = host.close().await {
        debug!(endpoint = %host.endpoint(), error = %e, "close failed");
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Fake masters and tablet servers served over a [`MemoryDialer`].

    use crate::pb::*;
    use std::time::Duration;
    use uuid::Uuid;
    use yb_session::testing::{MemoryDialer, Reply};
    use yb_wire::{Endpoint, ErrorStatusPb, RequestFrame, RpcErrorCode};

    pub fn uuid_bytes(uuid: &Uuid) -> Vec<u8> {
        uuid.simple().to_string().into_bytes()
    }

    pub fn status(endpoint: &Endpoint, uuid: &Uuid) -> ServerStatusPb {
        ServerStatusPb {
            node_instance: Some(NodeInstancePb {
                permanent_uuid: uuid_bytes(uuid),
                instance_seqno: 1,
                start_time_us: None,
            }),
            bound_rpc_addresses: vec![HostPortPb::from(endpoint)],
            bound_http_addresses: Vec::new(),
            version_info: Some(VersionInfoPb {
                version_number: Some("2.20.1.0".to_string()),
                build_number: Some("97".to_string()),
                ..Default::default()
            }),
        }
    }

    pub fn tserver_entry(endpoint: &Endpoint, uuid: &Uuid) -> TabletServerEntryPb {
        TabletServerEntryPb {
            instance_id: Some(NodeInstancePb {
                permanent_uuid: uuid_bytes(uuid),
                instance_seqno: 1,
                start_time_us: None,
            }),
            registration: Some(TsRegistrationPb {
                common: Some(ServerRegistrationPb {
                    private_rpc_addresses: vec![HostPortPb::from(endpoint)],
                    ..Default::default()
                }),
            }),
            millis_since_heartbeat: Some(120),
            alive: Some(true),
        }
    }

    pub fn no_such_method() -> Reply {
        Reply::Error(ErrorStatusPb {
            message: "no such method".to_string(),
            code: Some(RpcErrorCode::ErrorNoSuchMethod as i32),
        })
    }

    pub fn generic(frame: &RequestFrame, status: &ServerStatusPb) -> Option<Reply> {
        match frame.method() {
            Some(("yb.server.GenericService", "Ping")) => Some(Reply::message(&PingResponsePb {})),
            Some(("yb.server.GenericService", "GetStatus")) => Some(Reply::message(&GetStatusResponsePb {
                status: Some(status.clone()),
                error: None,
            })),
            _ => None,
        }
    }

    pub const CLUSTER_UUID: &str = "5a4f0c2e-8d7b-4b1a-9c3e-2f6d8e1a0b7c";

    pub fn cluster_config() -> SysClusterConfigEntryPb {
        SysClusterConfigEntryPb {
            version: Some(3),
            replication_info: None,
            cluster_uuid: Some(CLUSTER_UUID.to_string()),
        }
    }

    /// Master answering ListTabletServers with `listing`
    pub fn master(dialer: &MemoryDialer, endpoint: &Endpoint, listing: ListTabletServersResponsePb) {
        let status = status(endpoint, &Uuid::new_v4());
        let masters = ListMastersResponsePb {
            masters: vec![ServerEntryPb {
                error: None,
                instance_id: status.node_instance.clone(),
                registration: Some(ServerRegistrationPb {
                    private_rpc_addresses: vec![HostPortPb::from(endpoint)],
                    ..Default::default()
                }),
                role: Some(RaftRole::Leader as i32),
            }],
            error: None,
        };
        dialer.register(endpoint.clone(), move |frame: &RequestFrame| {
            if let Some(reply) = generic(frame, &status) {
                return reply;
            }
            match frame.method() {
                Some(("yb.master.MasterService", "ListTabletServers")) => Reply::message(&listing),
                Some(("yb.master.MasterService", "ListMasters")) => Reply::message(&masters),
                Some(("yb.master.MasterService", "GetMasterClusterConfig")) => {
                    Reply::message(&GetMasterClusterConfigResponsePb {
                        error: None,
                        cluster_config: Some(cluster_config()),
                    })
                }
                _ => no_such_method(),
            }
        });
    }

    /// Master answering ListTabletServers with a master error
    pub fn failing_master(dialer: &MemoryDialer, endpoint: &Endpoint, code: MasterErrorCode) {
        master(
            dialer,
            endpoint,
            ListTabletServersResponsePb {
                error: Some(MasterErrorPb {
                    code: code as i32,
                    status: Some(AppStatusPb {
                        code: 12,
                        message: Some(format!("{:?}", code)),
                        posix_code: None,
                    }),
                }),
                servers: Vec::new(),
            },
        );
    }

    /// Leader master listing `tservers`
    pub fn leader(dialer: &MemoryDialer, endpoint: &Endpoint, tservers: &[(Endpoint, Uuid)]) {
        let servers = tservers
            .iter()
            .map(|(endpoint, uuid)| tserver_entry(endpoint, uuid))
            .collect();
        master(
            dialer,
            endpoint,
            ListTabletServersResponsePb {
                error: None,
                servers,
            },
        );
    }

    /// Tablet server that accepts connections but never answers
    pub fn stalled_tserver(dialer: &MemoryDialer, endpoint: &Endpoint) {
        dialer.register(endpoint.clone(), |_: &RequestFrame| {
            Reply::Delayed(Duration::from_secs(3600), Box::new(Reply::Hangup))
        });
    }

    /// Tablet server answering the generic service
    pub fn tserver(dialer: &MemoryDialer, endpoint: &Endpoint, uuid: &Uuid) {
        let status = status(endpoint, uuid);
        dialer.register(endpoint.clone(), move |frame: &RequestFrame| {
            generic(frame, &status).unwrap_or_else(no_such_method)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pb::*;
    use std::time::Duration;
    use yb_session::testing::{MemoryDialer, Reply};

    fn master_ep(n: u8) -> Endpoint {
        Endpoint::new(format!("m{}", n), 7100)
    }

    fn tserver_ep(n: u8) -> Endpoint {
        Endpoint::new(format!("ts{}", n), 9100)
    }

    fn config(dialer: &MemoryDialer, masters: Vec<Endpoint>) -> UniverseConfig {
        UniverseConfig::new(masters).override_dialer(Arc::new(dialer.clone()))
    }

    /// One leader and three tablet servers, all reachable
    fn cluster(dialer: &MemoryDialer) -> Vec<(Endpoint, Uuid)> {
        let tservers: Vec<_> = (1..=3).map(|n| (tserver_ep(n), Uuid::new_v4())).collect();
        for (endpoint, uuid) in &tservers {
            fake::tserver(dialer, endpoint, uuid);
        }
        fake::leader(dialer, &master_ep(1), &tservers);
        tservers
    }

    #[tokio::test]
    async fn test_discovery_skips_unreachable_and_followers() {
        let dialer = MemoryDialer::new();
        let (a, b, c) = (master_ep(1), master_ep(2), master_ep(3));
        fake::failing_master(&dialer, &b, MasterErrorCode::NotTheLeader);
        fake::leader(&dialer, &c, &[(tserver_ep(1), Uuid::new_v4())]);

        let client = ClusterClient::connect(config(&dialer, vec![a.clone(), b.clone(), c.clone()]))
            .await
            .unwrap();
        assert_eq!(client.leader().endpoint(), &c);
        assert_eq!(client.tservers().len(), 1);

        assert_eq!(dialer.dial_count(&a), 1);
        assert_eq!(dialer.dial_count(&b), 1);
        assert_eq!(dialer.dial_count(&c), 1);

        dialer.wait_idle(&b).await;
        assert_eq!(dialer.active_connections(&b), 0);
        assert_eq!(dialer.active_connections(&c), 1);

        client.close().await.unwrap();
        dialer.wait_idle(&c).await;
        assert_eq!(dialer.active_connections(&c), 0);
    }

    #[tokio::test]
    async fn test_no_leader() {
        let dialer = MemoryDialer::new();
        fake::failing_master(&dialer, &master_ep(2), MasterErrorCode::NotTheLeader);

        let err = ClusterClient::connect(config(&dialer, vec![master_ep(1), master_ep(2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoLeader));
        assert_eq!(err.kind(), ErrorKind::Topology);
        assert_eq!(err.to_string(), "could not connect to master leader");
    }

    #[tokio::test]
    async fn test_other_master_error_aborts_discovery() {
        let dialer = MemoryDialer::new();
        fake::failing_master(&dialer, &master_ep(1), MasterErrorCode::CatalogManagerNotInitialized);
        fake::leader(&dialer, &master_ep(2), &[]);

        let err = ClusterClient::connect(config(&dialer, vec![master_ep(1), master_ep(2)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Master {
                method: "ListTabletServers",
                code: MasterErrorCode::CatalogManagerNotInitialized,
                ..
            }
        ));
        assert_eq!(dialer.dial_count(&master_ep(2)), 0);

        dialer.wait_idle(&master_ep(1)).await;
        assert_eq!(dialer.active_connections(&master_ep(1)), 0);
    }

    #[tokio::test]
    async fn test_unparsable_tserver_uuid_is_fatal() {
        let dialer = MemoryDialer::new();
        let mut entry = fake::tserver_entry(&tserver_ep(1), &Uuid::new_v4());
        if let Some(instance) = entry.instance_id.as_mut() {
            instance.permanent_uuid = b"garbage".to_vec();
        }
        fake::master(
            &dialer,
            &master_ep(1),
            ListTabletServersResponsePb {
                error: None,
                servers: vec![entry],
            },
        );
        fake::leader(&dialer, &master_ep(2), &[]);

        let err = ClusterClient::connect(config(&dialer, vec![master_ep(1), master_ep(2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidUuid { ref raw, .. } if raw == "garbage"));
        assert_eq!(dialer.dial_count(&master_ep(2)), 0);
    }

    #[tokio::test]
    async fn test_get_host_by_uuid_reuses_connection() {
        let dialer = MemoryDialer::new();
        let tservers = cluster(&dialer);
        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();

        let (endpoint, uuid) = &tservers[0];
        let first = client.get_host_by_uuid(uuid).await.unwrap();
        let second = client
            .host_by_permanent_uuid(&fake::uuid_bytes(uuid))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.endpoint(), endpoint);
        assert_eq!(first.uuid().unwrap(), *uuid);
        assert_eq!(dialer.dial_count(endpoint), 1);

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_resolution_dials_once() {
        let dialer = MemoryDialer::new();
        let tservers = cluster(&dialer);
        let client = Arc::new(
            ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
                .await
                .unwrap(),
        );

        let (endpoint, uuid) = tservers[1].clone();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.get_host_by_uuid(&uuid).await.unwrap() })
            })
            .collect();
        let mut hosts = Vec::new();
        for task in tasks {
            hosts.push(task.await.unwrap());
        }

        assert!(hosts.iter().all(|h| Arc::ptr_eq(h, &hosts[0])));
        assert_eq!(dialer.dial_count(&endpoint), 1);
    }

    #[tokio::test]
    async fn test_unknown_uuid() {
        let dialer = MemoryDialer::new();
        cluster(&dialer);
        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();

        let missing = Uuid::new_v4();
        let err = client.get_host_by_uuid(&missing).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownUuid(u) if u == missing));
        assert!(err.to_string().contains(&missing.to_string()));
    }

    #[tokio::test]
    async fn test_all_tservers_collects_dial_errors() {
        let dialer = MemoryDialer::new();
        let tservers = cluster(&dialer);
        dialer.unregister(&tservers[2].0);

        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();
        let (hosts, errors) = client.all_tservers().await;

        assert_eq!(hosts.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_dial());
        for (endpoint, _) in &tservers {
            assert_eq!(dialer.dial_count(endpoint), 1);
        }

        // Live nodes are pooled, the failed one is retried
        let (hosts, errors) = client.all_tservers().await;
        assert_eq!((hosts.len(), errors.len()), (2, 1));
        assert_eq!(dialer.dial_count(&tservers[0].0), 1);
        assert_eq!(dialer.dial_count(&tservers[2].0), 2);
    }

    #[tokio::test]
    async fn test_list_masters() {
        let dialer = MemoryDialer::new();
        cluster(&dialer);
        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();

        let masters = client.list_masters().await.unwrap();
        assert_eq!(masters.len(), 1);
        assert_eq!(masters[0].role(), RaftRole::Leader);
    }

    #[tokio::test]
    async fn test_close_releases_every_connection() {
        let dialer = MemoryDialer::new();
        let tservers = cluster(&dialer);
        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();
        let (hosts, errors) = client.all_tservers().await;
        assert_eq!((hosts.len(), errors.len()), (3, 0));
        drop(hosts);

        client.close().await.unwrap();
        dialer.wait_idle(&master_ep(1)).await;
        assert_eq!(dialer.active_connections(&master_ep(1)), 0);
        for (endpoint, _) in &tservers {
            dialer.wait_idle(endpoint).await;
            assert_eq!(dialer.active_connections(endpoint), 0);
        }
    }

    #[tokio::test]
    async fn test_stalled_tserver_does_not_block_other_lookups() {
        let dialer = MemoryDialer::new();
        let tservers = cluster(&dialer);
        let stalled = (tserver_ep(9), Uuid::new_v4());
        fake::stalled_tserver(&dialer, &stalled.0);
        let mut listing = tservers.clone();
        listing.push(stalled.clone());
        fake::leader(&dialer, &master_ep(1), &listing);

        let client = Arc::new(
            ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
                .await
                .unwrap(),
        );
        let cached = client.get_host_by_uuid(&tservers[0].1).await.unwrap();

        let hung = {
            let client = client.clone();
            let uuid = stalled.1;
            tokio::spawn(async move { client.get_host_by_uuid(&uuid).await })
        };
        while dialer.dial_count(&stalled.0) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let limit = Duration::from_secs(2);
        let again = tokio::time::timeout(limit, client.get_host_by_uuid(&tservers[0].1))
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&again, &cached));
        let fresh = tokio::time::timeout(limit, client.get_host_by_uuid(&tservers[1].1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.endpoint(), &tservers[1].0);

        // Callers for the stalled node wait on the dial already in progress
        let waiting = tokio::time::timeout(
            Duration::from_millis(50),
            client.get_host_by_uuid(&stalled.1),
        )
        .await;
        assert!(waiting.is_err());
        assert_eq!(dialer.dial_count(&stalled.0), 1);

        hung.abort();
        assert!(hung.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_host_is_redialed() {
        let dialer = MemoryDialer::new();
        let tservers = cluster(&dialer);
        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();
        let (endpoint, uuid) = &tservers[0];

        let first = client.get_host_by_uuid(uuid).await.unwrap();
        first.close().await.unwrap();
        assert!(first.is_defunct());

        let second = client.get_host_by_uuid(uuid).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_defunct());
        assert_eq!(dialer.dial_count(endpoint), 2);

        let third = client.get_host_by_uuid(uuid).await.unwrap();
        assert!(Arc::ptr_eq(&second, &third));

        client.close().await.unwrap();
        dialer.wait_idle(endpoint).await;
        assert_eq!(dialer.active_connections(endpoint), 0);
    }

    #[tokio::test]
    async fn test_host_left_mid_call_is_redialed() {
        let dialer = MemoryDialer::new();
        let endpoint = tserver_ep(1);
        let uuid = Uuid::new_v4();
        let status = fake::status(&endpoint, &uuid);
        dialer.register(endpoint.clone(), move |frame: &yb_wire::RequestFrame| {
            fake::generic(frame, &status).unwrap_or_else(|| {
                Reply::Delayed(
                    Duration::from_millis(200),
                    Box::new(fake::no_such_method()),
                )
            })
        });
        fake::leader(&dialer, &master_ep(1), &[(endpoint.clone(), uuid)]);
        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();

        let first = client.get_host_by_uuid(&uuid).await.unwrap();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            first
                .generic
                .get_flag(&GetFlagRequestPb {
                    flag: Some("replication_factor".to_string()),
                }),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(first.is_defunct());

        let second = client.get_host_by_uuid(&uuid).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(dialer.dial_count(&endpoint), 2);
        assert!(second.status().node_instance.is_some());
    }

    #[tokio::test]
    async fn test_master_cluster_config() {
        let dialer = MemoryDialer::new();
        cluster(&dialer);
        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();

        let cluster_config = client.master_cluster_config().await.unwrap();
        assert_eq!(cluster_config.cluster_uuid(), fake::CLUSTER_UUID);
        assert_eq!(cluster_config.version(), 3);
    }

    #[tokio::test]
    async fn test_master_cluster_config_error() {
        let dialer = MemoryDialer::new();
        let status = fake::status(&master_ep(1), &Uuid::new_v4());
        let listing = ListTabletServersResponsePb::default();
        dialer.register(master_ep(1), move |frame: &yb_wire::RequestFrame| {
            if let Some(reply) = fake::generic(frame, &status) {
                return reply;
            }
            match frame.method() {
                Some((_, "ListTabletServers")) => Reply::message(&listing),
                _ => Reply::message(&GetMasterClusterConfigResponsePb {
                    error: Some(MasterErrorPb {
                        code: MasterErrorCode::CatalogManagerNotInitialized as i32,
                        status: None,
                    }),
                    cluster_config: None,
                }),
            }
        });
        let client = ClusterClient::connect(config(&dialer, vec![master_ep(1)]))
            .await
            .unwrap();

        let err = client.master_cluster_config().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Master {
                method: "GetMasterClusterConfig",
                code: MasterErrorCode::CatalogManagerNotInitialized,
                ..
            }
        ));
    }
}
