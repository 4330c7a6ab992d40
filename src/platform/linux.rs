//! Linux command set (iproute2, procps kill, OpenBSD nc)

use super::PlatformCommands;
use crate::diagnostics::routes::RouteTableFormat;
use crate::validate::{Pid, Port, ProbeHost, RouteDestination};

pub struct LinuxCommands;

impl LinuxCommands {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxCommands {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformCommands for LinuxCommands {
    fn route_table_command(&self) -> Vec<String> {
        argv(&["ip", "-4", "route", "show"])
    }

    fn route_table_format(&self) -> RouteTableFormat {
        RouteTableFormat::Iproute2
    }

    fn interface_list_command(&self) -> Vec<String> {
        argv(&["ip", "-4", "addr", "show"])
    }

    fn delete_route_command(&self, destination: &RouteDestination) -> Vec<String> {
        argv(&["ip", "route", "delete", destination.as_str()])
    }

    fn kill_command(&self, pid: Pid) -> Vec<String> {
        vec!["kill".to_string(), "-9".to_string(), pid.to_string()]
    }

    fn probe_command(&self, host: &ProbeHost, port: Port, timeout_secs: u64) -> Vec<String> {
        vec![
            "nc".to_string(),
            "-z".to_string(),
            "-v".to_string(),
            "-w".to_string(),
            timeout_secs.to_string(),
            host.to_string(),
            port.to_string(),
        ]
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
