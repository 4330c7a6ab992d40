//! Platform-specific implementations
//!
//! Each platform supplies the argv for the handful of system tools the
//! supervisor and diagnostics shell out to. Commands are always built as
//! argument vectors; nothing here goes through a shell.

#[cfg(target_os = "macos")]
pub mod mac;

#[cfg(target_os = "linux")]
pub mod linux;

use crate::diagnostics::routes::RouteTableFormat;
use crate::validate::{Pid, Port, ProbeHost, RouteDestination};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Failed to start {0}")]
    SpawnError(String),
    #[error("Command failed: {0}")]
    CommandFailed(String),
    #[error("Failed to signal process {pid}: {message}")]
    SignalError { pid: u32, message: String },
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

/// Platform-agnostic system command interface
pub trait PlatformCommands: Send + Sync {
    /// Routing table dump
    fn route_table_command(&self) -> Vec<String>;
    /// Layout of the routing table dump
    fn route_table_format(&self) -> RouteTableFormat;
    /// Interface listing with IPv4 addresses
    fn interface_list_command(&self) -> Vec<String>;
    /// Route removal (run through the privileged helper)
    fn delete_route_command(&self, destination: &RouteDestination) -> Vec<String>;
    /// Forced process termination (run through the privileged helper)
    fn kill_command(&self, pid: Pid) -> Vec<String>;
    /// TCP reachability probe
    fn probe_command(&self, host: &ProbeHost, port: Port, timeout_secs: u64) -> Vec<String>;
    /// Full process listing
    fn process_list_command(&self) -> Vec<String> {
        vec!["ps".to_string(), "aux".to_string()]
    }
}

/// Get the command set for the current platform
pub fn current() -> Result<Box<dyn PlatformCommands>, PlatformError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(mac::MacCommands::new()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxCommands::new()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(PlatformError::UnsupportedPlatform)
    }
}

/// Run an unprivileged command to completion and return its stdout
pub async fn capture(argv: &[String]) -> Result<String, PlatformError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| PlatformError::CommandFailed("empty command".to_string()))?;

    debug!("exec: {}", argv.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| PlatformError::SpawnError(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PlatformError::CommandFailed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Signals used for tunnel shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
    Kill,
}

/// Deliver a signal to a child process we spawned
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: StopSignal) -> Result<(), PlatformError> {
    use nix::sys::signal::{kill, Signal};

    let raw = i32::try_from(pid).map_err(|_| PlatformError::SignalError {
        pid,
        message: "pid out of range".to_string(),
    })?;
    let sig = match signal {
        StopSignal::Interrupt => Signal::SIGINT,
        StopSignal::Terminate => Signal::SIGTERM,
        StopSignal::Kill => Signal::SIGKILL,
    };

    kill(nix::unistd::Pid::from_raw(raw), sig).map_err(|e| PlatformError::SignalError {
        pid,
        message: e.to_string(),
    })
}

#[cfg(not(unix))]
pub fn send_signal(_pid: u32, _signal: StopSignal) -> Result<(), PlatformError> {
    Err(PlatformError::UnsupportedPlatform)
}
