//! macOS command set (BSD netstat/route, ifconfig, BSD nc)

use super::PlatformCommands;
use crate::diagnostics::routes::RouteTableFormat;
use crate::validate::{Pid, Port, ProbeHost, RouteDestination};

pub struct MacCommands;

impl MacCommands {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacCommands {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformCommands for MacCommands {
    fn route_table_command(&self) -> Vec<String> {
        argv(&["netstat", "-rn"])
    }

    fn route_table_format(&self) -> RouteTableFormat {
        RouteTableFormat::Bsd
    }

    fn interface_list_command(&self) -> Vec<String> {
        argv(&["ifconfig"])
    }

    fn delete_route_command(&self, destination: &RouteDestination) -> Vec<String> {
        argv(&["route", "-n", "delete", destination.as_str()])
    }

    fn kill_command(&self, pid: Pid) -> Vec<String> {
        vec!["kill".to_string(), "-9".to_string(), pid.to_string()]
    }

    fn probe_command(&self, host: &ProbeHost, port: Port, timeout_secs: u64) -> Vec<String> {
        let timeout = timeout_secs.to_string();
        vec![
            "nc".to_string(),
            "-z".to_string(),
            "-v".to_string(),
            "-G".to_string(),
            timeout.clone(),
            "-w".to_string(),
            timeout,
            host.to_string(),
            port.to_string(),
        ]
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_delete_argv() {
        let dest = RouteDestination::parse("default").unwrap();
        assert_eq!(
            MacCommands::new().delete_route_command(&dest),
            vec!["route", "-n", "delete", "default"]
        );
    }

    #[test]
    fn test_route_table_is_bsd() {
        assert_eq!(MacCommands::default().route_table_format(), RouteTableFormat::Bsd);
    }
}
