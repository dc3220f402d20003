//! Host/port endpoints and the address syntax accepted on the command line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use thiserror::Error;

/// Default RPC port of master (topology coordinator) nodes
pub const DEFAULT_MASTER_PORT: u16 = 7100;
/// Default RPC port of tablet server (data) nodes
pub const DEFAULT_TSERVER_PORT: u16 = 9100;
/// Default YSQL (PostgreSQL protocol) port
pub const DEFAULT_YSQL_PORT: u16 = 5433;
/// Default YCQL (Cassandra protocol) port
pub const DEFAULT_YCQL_PORT: u16 = 9042;

/// Endpoint parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Nothing to parse
    #[error("master host list empty")]
    Empty,
    /// The port is not a valid u16
    #[error("invalid port in address {input:?}")]
    InvalidPort {
        /// Offending input
        input: String,
    },
    /// The address could not be split into host and port
    #[error("malformed address {input:?}: {reason}")]
    Malformed {
        /// Offending input
        input: String,
        /// What was wrong with it
        reason: &'static str,
    },
}

/// A network-reachable node address
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    /// DNS name or IP literal, without brackets
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from its parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 literal,
    /// applying `default_port` when none is given.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, EndpointError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EndpointError::Empty);
        }

        // A bare IPv6 literal cannot carry a port
        if is_basic_ipv6(input) {
            return Ok(Self::new(input, default_port));
        }

        if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| EndpointError::Malformed {
                input: input.to_string(),
                reason: "missing ']' in address",
            })?;
            if host.is_empty() {
                return Err(EndpointError::Malformed {
                    input: input.to_string(),
                    reason: "empty host",
                });
            }
            let port = match tail {
                "" => default_port,
                _ => match tail.strip_prefix(':') {
                    Some(port) => parse_port(port, input)?,
                    None => {
                        return Err(EndpointError::Malformed {
                            input: input.to_string(),
                            reason: "unexpected characters after ']'",
                        })
                    }
                },
            };
            return Ok(Self::new(host, port));
        }

        match input.rsplit_once(':') {
            None => Ok(Self::new(input, default_port)),
            Some((host, _)) if host.contains(':') => Err(EndpointError::Malformed {
                input: input.to_string(),
                reason: "too many colons in address",
            }),
            Some(("", _)) => Err(EndpointError::Malformed {
                input: input.to_string(),
                reason: "empty host",
            }),
            Some((host, port)) => Ok(Self::new(host, parse_port(port, input)?)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_basic_ipv6(&self.host) {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse a comma-separated address list
pub fn parse_endpoint_list(list: &str, default_port: u16) -> Result<Vec<Endpoint>, EndpointError> {
    if list.trim().is_empty() {
        return Err(EndpointError::Empty);
    }
    list.split(',')
        .map(|entry| Endpoint::parse(entry, default_port))
        .collect()
}

/// Whether `host` is an unbracketed IPv6 literal such as `2001:db8::68`
pub fn is_basic_ipv6(host: &str) -> bool {
    host.parse::<Ipv6Addr>().is_ok()
}

fn parse_port(port: &str, input: &str) -> Result<u16, EndpointError> {
    port.parse::<u16>().map_err(|_| EndpointError::InvalidPort {
        input: input.to_string(),
    })
}
