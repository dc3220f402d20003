//! yugatool binary.
//!
//! Inspects a YugabyteDB cluster over the native RPC protocol: pings
//! individual servers, reports the cluster topology and reads runtime
//! flags from every tablet server.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use yb_client::pb::{
    GetFlagRequestPb, GetStatusRequestPb, PingRequestPb, RaftRole, ServerEntryPb,
};
use yb_client::{ClusterClient, HostState};
use yb_session::Dialer;
use yb_wire::{Endpoint, DEFAULT_TSERVER_PORT};

mod config;
mod logging;
mod output;

use config::ToolConfig;
use logging::ToolLogFormatter;
use output::{
    render, ClusterReport, FlagReport, FlagRow, MasterRow, OutputFormat, PingReport, PingRow,
    TabletServerRow,
};

/// Inspect a YugabyteDB cluster over its native RPC protocol
#[derive(Parser, Debug)]
#[command(name = "yugatool", version, about = "Inspect a YugabyteDB cluster over its native RPC protocol")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
struct GlobalArgs {
    /// Comma-separated master addresses, e.g. 10.0.0.1,10.0.0.2:7100
    #[arg(short = 'm', long, global = true)]
    master_addresses: Option<String>,

    /// Connect timeout, e.g. 10s
    #[arg(long, global = true)]
    dial_timeout: Option<humantime::Duration>,

    /// CA bundle used to verify servers (PEM)
    #[arg(long, global = true)]
    cacert: Option<String>,

    /// Client certificate (PEM)
    #[arg(long, global = true, requires = "client_key")]
    client_cert: Option<String>,

    /// Client private key (PEM)
    #[arg(long, global = true, requires = "client_cert")]
    client_key: Option<String>,

    /// Do not verify server certificates
    #[arg(long, global = true)]
    skip_host_verification: bool,

    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(long, global = true)]
    debug: bool,

    /// Output format
    #[arg(short = 'o', long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to servers and report their identity and ping time
    Ping {
        /// Server addresses (default port 9100)
        #[arg(required = true)]
        hosts: Vec<String>,
    },
    /// Report masters and tablet servers of the cluster
    ClusterInfo,
    /// Read a runtime flag from every tablet server
    GetFlag {
        /// Flag name
        flag: String,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.global)?;

    let mut config = match &cli.global.config {
        Some(path) => ToolConfig::load_from_file(path)?,
        None => ToolConfig::default(),
    };
    config.apply_environment_overrides()?;
    apply_cli_overrides(&mut config, &cli.global);
    debug!(?config, "effective configuration");

    let format = cli.global.output;
    match &cli.command {
        Command::Ping { hosts } => {
            let report = ping(&config, hosts).await?;
            print!("{}", render(&report, format)?);
            let failed = report.servers.iter().filter(|s| s.error.is_some()).count();
            if failed > 0 {
                anyhow::bail!("{} of {} servers could not be pinged", failed, report.servers.len());
            }
        }
        Command::ClusterInfo => {
            let report = cluster_info(&config).await?;
            print!("{}", render(&report, format)?);
        }
        Command::GetFlag { flag } => {
            let report = get_flag(&config, flag).await?;
            print!("{}", render(&report, format)?);
        }
    }

    Ok(())
}

fn init_logging(args: &GlobalArgs) -> Result<()> {
    let level = if args.debug { "debug" } else { args.log_level.as_str() };

    let env_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("yugatool={}", level).parse()?)
            .add_directive(format!("yb_client={}", level).parse()?)
            .add_directive(format!("yb_session={}", level).parse()?)
            .add_directive(format!("yb_wire={}", level).parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(ToolLogFormatter::new("yugatool"))
        .init();
    Ok(())
}

/// Flags given on the command line win over file and environment
fn apply_cli_overrides(config: &mut ToolConfig, args: &GlobalArgs) {
    if let Some(masters) = &args.master_addresses {
        config.master_addresses = Some(masters.clone());
    }
    if let Some(timeout) = &args.dial_timeout {
        config.dial_timeout = Some(timeout.to_string());
    }
    if let Some(path) = &args.cacert {
        config.tls.cacert = Some(path.clone());
    }
    if let Some(path) = &args.client_cert {
        config.tls.client_cert = Some(path.clone());
    }
    if let Some(path) = &args.client_key {
        config.tls.client_key = Some(path.clone());
    }
    if args.skip_host_verification {
        config.tls.skip_host_verification = true;
    }
}

async fn ping(config: &ToolConfig, hosts: &[String]) -> Result<PingReport> {
    let endpoints = hosts
        .iter()
        .map(|h| Endpoint::parse(h, DEFAULT_TSERVER_PORT).with_context(|| format!("invalid address {:?}", h)))
        .collect::<Result<Vec<_>>>()?;

    let universe = config.universe_config(Vec::new())?;
    let dialer = universe.dialer()?;
    let timeout_millis = universe.rpc_timeout_millis;

    let servers = join_all(
        endpoints
            .iter()
            .map(|endpoint| ping_one(endpoint, dialer.as_ref(), timeout_millis)),
    )
    .await;
    Ok(PingReport { servers })
}

async fn ping_one(endpoint: &Endpoint, dialer: &dyn Dialer, timeout_millis: u32) -> PingRow {
    let mut row = PingRow {
        address: endpoint.to_string(),
        uuid: String::new(),
        rpc_addresses: Vec::new(),
        version: String::new(),
        rtt_ms: None,
        error: None,
    };

    let host = match HostState::connect(endpoint, dialer, timeout_millis).await {
        Ok(host) => host,
        Err(e) => {
            warn!(component = "ping", %endpoint, error = %e, "unable to connect");
            row.error = Some(e.to_string());
            return row;
        }
    };

    row.uuid = host_uuid(&host);
    row.rpc_addresses = host
        .status()
        .bound_rpc_addresses
        .iter()
        .map(|hp| format!("{}:{}", hp.host, hp.port))
        .collect();
    row.version = version_of(&host);

    let start = Instant::now();
    match host.generic.ping(&PingRequestPb {}).await {
        Ok(_) => row.rtt_ms = Some(start.elapsed().as_secs_f64() * 1000.0),
        Err(e) => row.error = Some(e.to_string()),
    }

    if let Err(e) = host.close().await {
        debug!(%endpoint, error = %e, "close failed");
    }
    row
}

async fn connect_cluster(config: &ToolConfig) -> Result<ClusterClient> {
    let universe = config.universe_config(config.masters()?)?;
    let cluster = ClusterClient::connect(universe)
        .await
        .context("unable to discover the cluster")?;
    info!(component = "cluster", leader = %cluster.leader().endpoint(), "discovered cluster");
    Ok(cluster)
}

async fn close_cluster(cluster: ClusterClient) {
    if let Err(e) = cluster.close().await {
        warn!(error = %e, "failed to close cluster connections");
    }
}

/// Resolve every tablet server, skipping the ones that cannot be dialed
async fn reachable_tservers(cluster: &ClusterClient) -> Result<Vec<Arc<HostState>>> {
    let (hosts, errors) = cluster.all_tservers().await;
    for err in errors {
        if err.is_dial() {
            warn!(error = %err, "skipping unreachable tablet server");
        } else {
            return Err(err).context("unable to connect to tablet server");
        }
    }
    Ok(hosts)
}

async fn cluster_info(config: &ToolConfig) -> Result<ClusterReport> {
    let cluster = connect_cluster(config).await?;
    let report = collect_cluster_report(&cluster).await;
    close_cluster(cluster).await;
    report
}

async fn collect_cluster_report(cluster: &ClusterClient) -> Result<ClusterReport> {
    let cluster_config = cluster
        .master_cluster_config()
        .await
        .context("could not get cluster config")?;

    let masters = cluster
        .list_masters()
        .await
        .context("unable to list masters")?
        .iter()
        .map(master_row)
        .collect();

    let hosts = reachable_tservers(cluster).await?;
    let statuses = join_all(hosts.iter().map(|host| async move {
        let status = host.generic.get_status(&GetStatusRequestPb {}).await;
        (host.uuid().ok(), status)
    }))
    .await;

    let mut versions: HashMap<Uuid, Result<String, String>> = HashMap::new();
    for (uuid, status) in statuses {
        let Some(uuid) = uuid else { continue };
        let version = match status {
            Ok(response) => match (response.error, response.status) {
                (Some(error), _) => Err(error.message.unwrap_or_default()),
                (None, Some(status)) => Ok(status.version_info.unwrap_or_default().display_version()),
                (None, None) => Err("no status reported".to_string()),
            },
            Err(e) => Err(e.to_string()),
        };
        versions.insert(uuid, version);
    }

    let tablet_servers = cluster
        .tservers()
        .iter()
        .map(|ts| {
            let (version, error) = match versions.get(&ts.uuid) {
                Some(Ok(version)) => (version.clone(), None),
                Some(Err(e)) => (String::new(), Some(e.clone())),
                None => (String::new(), Some("unreachable".to_string())),
            };
            TabletServerRow {
                uuid: ts.uuid.simple().to_string(),
                rpc_address: ts.rpc_address().map(|e| e.to_string()).unwrap_or_default(),
                alive: ts.entry.alive(),
                millis_since_heartbeat: ts.entry.millis_since_heartbeat(),
                version,
                error,
            }
        })
        .collect();

    Ok(ClusterReport {
        cluster_uuid: cluster_config.cluster_uuid().to_string(),
        config_version: cluster_config.version(),
        live_replicas: cluster_config
            .replication_info
            .as_ref()
            .and_then(|r| r.live_replicas.as_ref())
            .map(|p| p.num_replicas()),
        zones: cluster_config.live_zones(),
        leader: cluster.leader().endpoint().to_string(),
        masters,
        tablet_servers,
    })
}

fn master_row(entry: &ServerEntryPb) -> MasterRow {
    MasterRow {
        uuid: entry
            .instance_id
            .as_ref()
            .map(|i| String::from_utf8_lossy(&i.permanent_uuid).into_owned())
            .unwrap_or_default(),
        rpc_addresses: entry
            .registration
            .as_ref()
            .map(|r| {
                r.private_rpc_addresses
                    .iter()
                    .map(|hp| format!("{}:{}", hp.host, hp.port))
                    .collect()
            })
            .unwrap_or_default(),
        role: role_name(entry.role()).to_string(),
        error: entry.error.as_ref().and_then(|e| e.message.clone()),
    }
}

fn role_name(role: RaftRole) -> &'static str {
    match role {
        RaftRole::Leader => "LEADER",
        RaftRole::Follower => "FOLLOWER",
        RaftRole::Learner => "LEARNER",
        RaftRole::NonParticipant => "NON_PARTICIPANT",
        RaftRole::ReadReplica => "READ_REPLICA",
        RaftRole::UnknownRole => "UNKNOWN",
    }
}

async fn get_flag(config: &ToolConfig, flag: &str) -> Result<FlagReport> {
    let cluster = connect_cluster(config).await?;
    let report = collect_flags(&cluster, flag).await;
    close_cluster(cluster).await;
    report
}

async fn collect_flags(cluster: &ClusterClient, flag: &str) -> Result<FlagReport> {
    let hosts = reachable_tservers(cluster).await?;
    let request = GetFlagRequestPb {
        flag: Some(flag.to_string()),
    };

    let responses = join_all(hosts.iter().map(|host| {
        let request = &request;
        async move { (host, host.generic.get_flag(request).await) }
    }))
    .await;

    let mut servers = Vec::with_capacity(responses.len());
    for (host, response) in responses {
        let response = response.with_context(|| format!("GetFlag failed on {}", host.endpoint()))?;
        servers.push(FlagRow {
            uuid: host_uuid(host),
            address: host.endpoint().to_string(),
            valid: response.valid(),
            value: response.value().to_string(),
        });
    }

    Ok(FlagReport {
        flag: flag.to_string(),
        servers,
    })
}

fn host_uuid(host: &HostState) -> String {
    host.uuid().map(|u| u.simple().to_string()).unwrap_or_default()
}

fn version_of(host: &HostState) -> String {
    host.status()
        .version_info
        .as_ref()
        .map(|v| v.display_version())
        .unwrap_or_else(|| "unknown".to_string())
}
