//! TCP reachability probe with a hard deadline

use crate::error::VpnError;
use crate::platform::PlatformCommands;
use crate::validate::{Port, ProbeHost};
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

pub const DEFAULT_PROBE_DEADLINE: Duration = Duration::from_secs(5);

/// Output phrases `nc -z -v` prints on a successful connect
const REACHABLE_PHRASES: &[&str] = &["succeeded", "open"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub reachable: bool,
    pub message: String,
}

impl ProbeResult {
    fn unreachable(message: impl Into<String>) -> Self {
        Self {
            reachable: false,
            message: message.into(),
        }
    }
}

/// Try to open a TCP connection to `host:port`
///
/// Always resolves within `deadline`; a probe still running then is killed.
/// Only malformed input is an error.
pub async fn test_connectivity(
    platform: &dyn PlatformCommands,
    host: &str,
    port: &str,
    deadline: Duration,
) -> Result<ProbeResult, VpnError> {
    let host = ProbeHost::parse(host)?;
    let port = Port::parse(port)?;
    let argv = platform.probe_command(&host, port, deadline.as_secs().max(1));

    let Some((program, args)) = argv.split_first() else {
        return Ok(ProbeResult::unreachable("No probe command available"));
    };
    debug!("probe: {}", argv.join(" "));

    let child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return Ok(ProbeResult::unreachable(format!("Failed to run {}: {}", program, e))),
    };

    // Dropping the future on expiry drops the child, which kills it
    let output = match timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Ok(ProbeResult::unreachable(format!("Probe failed: {}", e))),
        Err(_) => {
            info!("Probe of {}:{} timed out", host, port);
            return Ok(ProbeResult::unreachable(format!(
                "Connection timed out after {} seconds",
                deadline.as_secs_f32()
            )));
        }
    };

    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let reachable = output.status.success() && REACHABLE_PHRASES.iter().any(|p| text.contains(p));

    let message = if reachable {
        format!("Connection to {}:{} succeeded", host, port)
    } else {
        match text.trim() {
            "" => format!("Connection to {}:{} failed", host, port),
            detail => format!("Connection to {}:{} failed: {}", host, port, detail),
        }
    };
    info!("{}", message);

    Ok(ProbeResult { reachable, message })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::diagnostics::routes::RouteTableFormat;
    use crate::validate::{Pid, RouteDestination};
    use std::time::Instant;

    /// Probe command replaced by a shell snippet
    struct ScriptedProbe(&'static str);

    impl PlatformCommands for ScriptedProbe {
        fn route_table_command(&self) -> Vec<String> {
            vec![]
        }
        fn route_table_format(&self) -> RouteTableFormat {
            RouteTableFormat::Iproute2
        }
        fn interface_list_command(&self) -> Vec<String> {
            vec![]
        }
        fn delete_route_command(&self, _destination: &RouteDestination) -> Vec<String> {
            vec![]
        }
        fn kill_command(&self, _pid: Pid) -> Vec<String> {
            vec![]
        }
        fn probe_command(&self, _host: &ProbeHost, _port: Port, _timeout_secs: u64) -> Vec<String> {
            vec!["/bin/sh".to_string(), "-c".to_string(), self.0.to_string()]
        }
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let platform = ScriptedProbe("exit 0");
        let result = test_connectivity(&platform, "host; reboot", "22", DEFAULT_PROBE_DEADLINE).await;
        assert!(matches!(result, Err(VpnError::InvalidInput(_))));

        let result = test_connectivity(&platform, "example.com", "0", DEFAULT_PROBE_DEADLINE).await;
        assert!(matches!(result, Err(VpnError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_success_needs_exit_zero_and_phrase() {
        let platform = ScriptedProbe("echo 'Connection to example.com port 443 [tcp/https] succeeded!' >&2");
        let result = test_connectivity(&platform, "example.com", "443", DEFAULT_PROBE_DEADLINE)
            .await
            .unwrap();
        assert!(result.reachable);

        let platform = ScriptedProbe("exit 0");
        let result = test_connectivity(&platform, "example.com", "443", DEFAULT_PROBE_DEADLINE)
            .await
            .unwrap();
        assert!(!result.reachable);

        let platform = ScriptedProbe("echo 'port open'; exit 1");
        let result = test_connectivity(&platform, "example.com", "443", DEFAULT_PROBE_DEADLINE)
            .await
            .unwrap();
        assert!(!result.reachable);
    }

    #[tokio::test]
    async fn test_deadline_always_resolves() {
        let platform = ScriptedProbe("exec sleep 30");
        let started = Instant::now();
        let result = test_connectivity(&platform, "example.com", "9999", Duration::from_millis(300))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!result.reachable);
        assert!(result.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_probe_tool_is_unreachable() {
        struct Missing;
        impl PlatformCommands for Missing {
            fn route_table_command(&self) -> Vec<String> {
                vec![]
            }
            fn route_table_format(&self) -> RouteTableFormat {
                RouteTableFormat::Bsd
            }
            fn interface_list_command(&self) -> Vec<String> {
                vec![]
            }
            fn delete_route_command(&self, _d: &RouteDestination) -> Vec<String> {
                vec![]
            }
            fn kill_command(&self, _p: Pid) -> Vec<String> {
                vec![]
            }
            fn probe_command(&self, _h: &ProbeHost, _p: Port, _t: u64) -> Vec<String> {
                vec!["/nonexistent/nc".to_string()]
            }
        }

        let result = test_connectivity(&Missing, "10.0.0.1", "22", DEFAULT_PROBE_DEADLINE)
            .await
            .unwrap();
        assert!(!result.reachable);
        assert!(result.message.starts_with("Failed to run"));
    }
}
