//! Network interface collection
//!
//! Handles both `ifconfig` blocks (`en0: flags=...`, `status: active`) and
//! `ip addr` blocks (`2: eth0: <...> ... state UP`).

use crate::error::VpnError;
use crate::platform::{capture, PlatformCommands};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceRecord {
    pub name: String,
    pub ip: Option<String>,
    pub status: Option<String>,
}

impl InterfaceRecord {
    /// Has an IPv4 address and is not reported as down
    pub fn is_active(&self) -> bool {
        self.ip.is_some() && self.status.as_deref().is_none_or(|s| s == "active")
    }
}

pub fn parse_interfaces(text: &str) -> Vec<InterfaceRecord> {
    let mut interfaces: Vec<InterfaceRecord> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if !line.starts_with(char::is_whitespace) {
            if let Some(record) = parse_header(line) {
                interfaces.push(record);
            }
            continue;
        }

        let Some(current) = interfaces.last_mut() else {
            continue;
        };
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("inet") if current.ip.is_none() => {
                if let Some(addr) = tokens.next() {
                    let addr = addr.split('/').next().unwrap_or(addr);
                    current.ip = Some(addr.to_string());
                }
            }
            Some("status:") => {
                current.status = tokens.next().map(str::to_string);
            }
            _ => {}
        }
    }

    interfaces
}

fn parse_header(line: &str) -> Option<InterfaceRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let first = tokens.first()?.strip_suffix(':')?;

    // iproute2: "<index>: <name>: <FLAGS> ... state UP ..."
    if first.chars().all(|c| c.is_ascii_digit()) {
        let name = tokens.get(1)?.trim_end_matches(':');
        let name = name.split('@').next().unwrap_or(name);
        let status = tokens
            .windows(2)
            .find(|pair| pair[0] == "state")
            .map(|pair| match pair[1] {
                "UP" => "active".to_string(),
                "DOWN" => "inactive".to_string(),
                other => other.to_ascii_lowercase(),
            })
            .filter(|s| s != "unknown");
        return Some(InterfaceRecord {
            name: name.to_string(),
            ip: None,
            status,
        });
    }

    Some(InterfaceRecord {
        name: first.to_string(),
        ip: None,
        status: None,
    })
}

pub async fn list_interfaces(
    platform: &dyn PlatformCommands,
) -> Result<Vec<InterfaceRecord>, VpnError> {
    let output = capture(&platform.interface_list_command()).await?;
    Ok(parse_interfaces(&output))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFCONFIG: &str = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\toptions=1203<RXCSUM,TXCSUM,TXSTATUS,SW_TIMESTAMP>
\tinet 127.0.0.1 netmask 0xff000000
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether a4:83:e7:00:00:01
\tinet 192.168.1.50 netmask 0xffffff00 broadcast 192.168.1.255
\tstatus: active
en1: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tinet 10.1.1.9 netmask 0xffffff00 broadcast 10.1.1.255
\tstatus: inactive
utun3: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1380
";

    const IP_ADDR: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN group default qlen 1000
    inet 127.0.0.1/8 scope host lo
       valid_lft forever preferred_lft forever
2: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP group default qlen 1000
    inet 192.168.1.50/24 brd 192.168.1.255 scope global dynamic wlan0
    inet 192.168.1.77/24 scope global secondary wlan0
3: veth0@if4: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN group default qlen 1000
    inet 172.17.0.1/16 scope global veth0
";

    #[test]
    fn test_ifconfig_blocks() {
        let interfaces = parse_interfaces(IFCONFIG);
        assert_eq!(interfaces.len(), 4);

        assert_eq!(interfaces[0].name, "lo0");
        assert_eq!(interfaces[0].ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(interfaces[0].status, None);

        assert_eq!(
            interfaces[1],
            InterfaceRecord {
                name: "en0".to_string(),
                ip: Some("192.168.1.50".to_string()),
                status: Some("active".to_string()),
            }
        );
        assert!(interfaces[1].is_active());
        assert!(!interfaces[2].is_active());

        assert_eq!(interfaces[3].name, "utun3");
        assert_eq!(interfaces[3].ip, None);
        assert!(!interfaces[3].is_active());
    }

    #[test]
    fn test_ip_addr_blocks() {
        let interfaces = parse_interfaces(IP_ADDR);
        assert_eq!(interfaces.len(), 3);

        assert_eq!(interfaces[0].name, "lo");
        assert_eq!(interfaces[0].status, None);
        assert!(interfaces[0].is_active());

        assert_eq!(interfaces[1].name, "wlan0");
        assert_eq!(interfaces[1].ip.as_deref(), Some("192.168.1.50"));
        assert_eq!(interfaces[1].status.as_deref(), Some("active"));

        assert_eq!(interfaces[2].name, "veth0");
        assert_eq!(interfaces[2].status.as_deref(), Some("inactive"));
        assert!(!interfaces[2].is_active());
    }

    #[test]
    fn test_continuation_without_header_ignored() {
        assert!(parse_interfaces("\tinet 10.0.0.1 netmask 0xff000000\n").is_empty());
    }
}
