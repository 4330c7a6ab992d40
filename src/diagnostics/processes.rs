//! Running tunnel process discovery (`ps aux`)

use crate::error::VpnError;
use crate::platform::{capture, PlatformCommands};
use crate::validate::Pid;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub user: String,
    pub pid: Pid,
    pub command: String,
}

/// Lines that look like a running openconnect client
fn is_tunnel_process(command: &str) -> bool {
    if !command.contains("openconnect") {
        return false;
    }
    if command.contains("grep") || command.contains("ocvpn") {
        return false;
    }
    command.contains("sudo") || command.starts_with("/usr") || command.starts_with("/opt")
}

/// Parse `ps aux` rows: USER PID %CPU %MEM VSZ RSS TT STAT STARTED TIME COMMAND
pub fn parse_process_list(text: &str) -> Vec<ProcessRecord> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 11 {
                return None;
            }
            let command = fields[10..].join(" ");
            if !is_tunnel_process(&command) {
                return None;
            }
            let pid = Pid::parse(fields[1]).ok()?;
            Some(ProcessRecord {
                user: fields[0].to_string(),
                pid,
                command,
            })
        })
        .collect()
}

pub async fn list_tunnel_processes(
    platform: &dyn PlatformCommands,
) -> Result<Vec<ProcessRecord>, VpnError> {
    let output = capture(&platform.process_list_command()).await?;
    Ok(parse_process_list(&output))
}
