//! Port publishing specs: `[ip:][host:]container[/proto]` with ranges

use crate::{CliError, Result};
use std::fmt;
use std::net::IpAddr;

const PROTOCOLS: &[&str] = &["tcp", "udp", "sctp"];

/// One published port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_ip: String,
    /// Host port or range; empty lets the daemon choose.
    pub host_port: String,
    pub container_port: u16,
    pub protocol: String,
}

impl PortMapping {
    /// Key used by the daemon API, e.g. `80/tcp`
    pub fn port_key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.host_ip.is_empty() {
            write!(f, "{}:", self.host_ip)?;
        }
        if !self.host_port.is_empty() {
            write!(f, "{}->", self.host_port)?;
        }
        write!(f, "{}", self.port_key())
    }
}

fn parse_range(raw: &str, spec: &str) -> Result<(u16, u16)> {
    let invalid = || CliError::invalid_argument(format!("invalid port specification: {:?}", spec));
    let parse = |p: &str| p.trim().parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(invalid);
    match raw.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (parse(start)?, parse(end)?);
            if end < start {
                return Err(CliError::invalid_argument(format!(
                    "invalid range specified for port: {}",
                    raw
                )));
            }
            Ok((start, end))
        }
        None => {
            let port = parse(raw)?;
            Ok((port, port))
        }
    }
}

/// Parse a `--publish` value into one mapping per container port.
pub fn parse_port_spec(spec: &str) -> Result<Vec<PortMapping>> {
    let (raw, protocol) = match spec.rsplit_once('/') {
        Some((raw, proto)) => (raw, proto.to_lowercase()),
        None => (spec, "tcp".to_string()),
    };
    if !PROTOCOLS.contains(&protocol.as_str()) {
        return Err(CliError::invalid_argument(format!(
            "invalid proto: {}",
            protocol
        )));
    }

    let mut parts = raw.rsplitn(3, ':');
    let container = parts.next().unwrap_or_default();
    let host = parts.next().unwrap_or_default();
    let ip = parts
        .next()
        .unwrap_or_default()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();

    if container.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "no port specified: {}",
            spec
        )));
    }
    if !ip.is_empty() && ip.parse::<IpAddr>().is_err() {
        return Err(CliError::invalid_argument(format!("invalid IP address: {}", ip)));
    }

    let (c_start, c_end) = parse_range(container, spec)?;
    let host_range = if host.is_empty() {
        None
    } else {
        Some(parse_range(host, spec)?)
    };

    let mapping = |host_port: String, container_port: u16| PortMapping {
        host_ip: ip.clone(),
        host_port,
        container_port,
        protocol: protocol.clone(),
    };

    match host_range {
        None => Ok((c_start..=c_end).map(|p| mapping(String::new(), p)).collect()),
        Some((h_start, h_end)) if h_end - h_start == c_end - c_start => Ok((0..=(c_end - c_start))
            .map(|i| mapping((h_start + i).to_string(), c_start + i))
            .collect()),
        Some((h_start, h_end)) if c_start == c_end => {
            Ok(vec![mapping(format!("{}-{}", h_start, h_end), c_start)])
        }
        Some(_) => Err(CliError::invalid_argument(format!(
            "invalid ranges specified for container and host Ports: {}",
            spec
        ))),
    }
}
