//! Report rendering as aligned text tables, JSON or YAML.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

/// Output format selected with `-o`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

/// A report that can also be printed as text tables
pub trait Report: Serialize {
    /// Text rendering
    fn table(&self) -> String;
}

/// Render `report` in `format`
pub fn render<R: Report>(report: &R, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Table => report.table(),
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(report)?;
            out.push('\n');
            out
        }
        OutputFormat::Yaml => serde_yaml::to_string(report)?,
    })
}

/// Format `rows` under `headers` with left-aligned columns
pub fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    for row in std::iter::once(&header_cells).chain(rows) {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Outcome of pinging one server
#[derive(Debug, Clone, Serialize)]
pub struct PingRow {
    pub address: String,
    pub uuid: String,
    pub rpc_addresses: Vec<String>,
    pub version: String,
    pub rtt_ms: Option<f64>,
    pub error: Option<String>,
}

/// Reports of the `ping` command
#[derive(Debug, Clone, Serialize)]
pub struct PingReport {
    pub servers: Vec<PingRow>,
}

impl Report for PingReport {
    fn table(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .servers
            .iter()
            .map(|s| {
                vec![
                    s.address.clone(),
                    s.uuid.clone(),
                    s.rpc_addresses.join(","),
                    s.version.clone(),
                    match (s.rtt_ms, &s.error) {
                        (_, Some(error)) => format!("error: {}", error),
                        (Some(rtt), None) => format!("{:.2}ms", rtt),
                        (None, None) => String::new(),
                    },
                ]
            })
            .collect();
        format_table(&["ADDRESS", "UUID", "RPC ADDRESSES", "VERSION", "PING"], &rows)
    }
}

/// One master of the Raft configuration
#[derive(Debug, Clone, Serialize)]
pub struct MasterRow {
    pub uuid: String,
    pub rpc_addresses: Vec<String>,
    pub role: String,
    pub error: Option<String>,
}

/// One tablet server of the topology
#[derive(Debug, Clone, Serialize)]
pub struct TabletServerRow {
    pub uuid: String,
    pub rpc_address: String,
    pub alive: bool,
    pub millis_since_heartbeat: i32,
    pub version: String,
    pub error: Option<String>,
}

/// Report of the `cluster-info` command
#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub cluster_uuid: String,
    pub config_version: i32,
    pub live_replicas: Option<i32>,
    pub zones: Vec<String>,
    pub leader: String,
    pub masters: Vec<MasterRow>,
    pub tablet_servers: Vec<TabletServerRow>,
}

impl Report for ClusterReport {
    fn table(&self) -> String {
        let masters: Vec<Vec<String>> = self
            .masters
            .iter()
            .map(|m| {
                vec![
                    m.uuid.clone(),
                    m.rpc_addresses.join(","),
                    m.role.clone(),
                    m.error.clone().unwrap_or_default(),
                ]
            })
            .collect();
        let tservers: Vec<Vec<String>> = self
            .tablet_servers
            .iter()
            .map(|t| {
                vec![
                    t.uuid.clone(),
                    t.rpc_address.clone(),
                    if t.alive { "ALIVE" } else { "DEAD" }.to_string(),
                    t.millis_since_heartbeat.to_string(),
                    t.version.clone(),
                    t.error.clone().unwrap_or_default(),
                ]
            })
            .collect();

        let replicas = self.live_replicas.map(|n| n.to_string()).unwrap_or_default();
        let identity = format_table(
            &["CLUSTER UUID", "LIVE REPLICAS", "ZONES", "VERSION"],
            &[vec![
                self.cluster_uuid.clone(),
                replicas,
                self.zones.join(","),
                self.config_version.to_string(),
            ]],
        );

        format!(
            "{}\nMaster leader: {}\n\nMasters:\n{}\nTablet servers:\n{}",
            identity,
            self.leader,
            format_table(&["UUID", "RPC ADDRESSES", "ROLE", "ERROR"], &masters),
            format_table(
                &["UUID", "RPC ADDRESS", "STATE", "HEARTBEAT MS", "VERSION", "ERROR"],
                &tservers
            ),
        )
    }
}

/// Flag value on one tablet server
#[derive(Debug, Clone, Serialize)]
pub struct FlagRow {
    pub uuid: String,
    pub address: String,
    pub valid: bool,
    pub value: String,
}

/// Report of the `get-flag` command
#[derive(Debug, Clone, Serialize)]
pub struct FlagReport {
    pub flag: String,
    pub servers: Vec<FlagRow>,
}

impl Report for FlagReport {
    fn table(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .servers
            .iter()
            .map(|s| {
                let value = if s.valid {
                    s.value.clone()
                } else {
                    "<unknown flag>".to_string()
                };
                vec![s.uuid.clone(), s.address.clone(), value]
            })
            .collect();
        format_table(&["UUID", "ADDRESS", &self.flag.to_uppercase()], &rows)
    }
}
