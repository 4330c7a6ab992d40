//! Routing table collection

use crate::error::VpnError;
use crate::platform::{capture, PlatformCommands};
use serde::Serialize;
use tracing::debug;

/// Layout of the routing table dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTableFormat {
    /// `netstat -rn`: IPv4 rows between `Internet:` and `Internet6:`
    Bsd,
    /// `ip -4 route show`
    Iproute2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRecord {
    pub destination: String,
    pub gateway: String,
    pub flags: String,
    pub interface: String,
}

impl RouteRecord {
    pub fn is_default(&self) -> bool {
        self.destination == "default" || self.destination == "0.0.0.0/0"
    }
}

pub fn parse_route_table(text: &str, format: RouteTableFormat) -> Vec<RouteRecord> {
    match format {
        RouteTableFormat::Bsd => parse_netstat(text),
        RouteTableFormat::Iproute2 => parse_iproute2(text),
    }
}

fn parse_netstat(text: &str) -> Vec<RouteRecord> {
    let mut routes = Vec::new();
    let mut in_ipv4 = false;

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("Internet:") {
            in_ipv4 = true;
            continue;
        }
        if line.starts_with("Internet6:") {
            break;
        }
        if !in_ipv4 || line.is_empty() || line.starts_with("Destination") {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        routes.push(RouteRecord {
            destination: fields[0].to_string(),
            gateway: fields[1].to_string(),
            flags: fields[2].to_string(),
            interface: fields[3].to_string(),
        });
    }

    routes
}

/// Route types that never carry traffic out of an interface
const IPROUTE2_SKIPPED_TYPES: &[&str] = &["unreachable", "blackhole", "prohibit", "throw"];

fn parse_iproute2(text: &str) -> Vec<RouteRecord> {
    let mut routes = Vec::new();

    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&destination) = fields.first() else {
            continue;
        };
        if IPROUTE2_SKIPPED_TYPES.contains(&destination) {
            continue;
        }

        let value_after = |key: &str| {
            fields
                .windows(2)
                .find(|pair| pair[0] == key)
                .map(|pair| pair[1].to_string())
        };
        let Some(interface) = value_after("dev") else {
            debug!("Skipping route without device: {}", line);
            continue;
        };

        let (gateway, flags) = match value_after("via") {
            Some(gateway) => (gateway, "UG"),
            None => (format!("link#{}", interface), "U"),
        };

        routes.push(RouteRecord {
            destination: destination.to_string(),
            gateway,
            flags: flags.to_string(),
            interface,
        });
    }

    routes
}

/// Dump and parse the current IPv4 routing table
pub async fn list_routes(platform: &dyn PlatformCommands) -> Result<Vec<RouteRecord>, VpnError> {
    let output = capture(&platform.route_table_command()).await?;
    let routes = parse_route_table(&output, platform.route_table_format());
    debug!("Parsed {} routes", routes.len());
    Ok(routes)
}
