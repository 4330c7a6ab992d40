//! Credential-seeding launcher for the tunnel client
//!
//! openconnect always prompts for its username and password, and needs an
//! administrator password for sudo first. The bridge runs the tunnel client
//! under an `expect` driver script and hands it all three credentials over
//! stdin. The driver answers each prompt once and reports rejected
//! credentials or a prompt timeout as sentinel lines (see `markers`).

use crate::error::VpnError;
use crate::openconnect::locate::{check_binary_presence, first_existing};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Environment variable the driver script reads its prompt timeout from
pub const PROMPT_TIMEOUT_ENV: &str = "OCVPN_PROMPT_TIMEOUT";

/// Everything a launcher needs to start one tunnel session
pub struct LaunchRequest {
    pub tunnel_binary: PathBuf,
    pub tunnel_args: Vec<String>,
    pub elevation_credential: SecretString,
    pub username: String,
    pub password: SecretString,
}

/// Starts the tunnel client with its prompts pre-seeded
///
/// The returned child has piped stdout and stderr carrying the tunnel
/// client's console output. Its stdin, if still present, belongs to the
/// caller and is closed on disconnect.
#[async_trait]
pub trait TunnelLauncher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> Result<Child, VpnError>;
}

/// `expect`-driven launcher
pub struct ExpectBridge {
    expect_candidates: Vec<PathBuf>,
    script_candidates: Vec<PathBuf>,
    prompt_timeout: Option<Duration>,
}

impl ExpectBridge {
    pub fn new(expect_candidates: Vec<PathBuf>, script_candidates: Vec<PathBuf>) -> Self {
        Self {
            expect_candidates,
            script_candidates,
            prompt_timeout: None,
        }
    }

    /// How long the driver waits for each prompt before reporting a timeout
    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = Some(timeout);
        self
    }

    fn resolve(&self) -> Result<(PathBuf, PathBuf), VpnError> {
        let script = first_existing(&self.script_candidates).ok_or_else(|| {
            VpnError::ScriptNotFound(
                self.script_candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        })?;

        let expect = check_binary_presence("expect", &self.expect_candidates)
            .path
            .ok_or_else(|| VpnError::BinaryNotFound("expect".to_string()))?;

        Ok((expect, script))
    }
}

#[async_trait]
impl TunnelLauncher for ExpectBridge {
    async fn launch(&self, request: LaunchRequest) -> Result<Child, VpnError> {
        let (expect, script) = self.resolve()?;
        info!("Starting driver {}", script.display());
        debug!(
            "Driver argv: {} -f {} -- {} {}",
            expect.display(),
            script.display(),
            request.tunnel_binary.display(),
            request.tunnel_args.join(" ")
        );

        let mut command = Command::new(&expect);
        command
            .arg("-f")
            .arg(&script)
            .arg("--")
            .arg(&request.tunnel_binary)
            .args(&request.tunnel_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(timeout) = self.prompt_timeout {
            command.env(PROMPT_TIMEOUT_ENV, timeout.as_secs().max(1).to_string());
        }

        let mut child = command
            .spawn()
            .map_err(|e| VpnError::ProcessSpawnError(format!("{}: {}", expect.display(), e)))?;

        seed_credentials(&mut child, &request).await?;
        Ok(child)
    }
}

/// Write the three credential lines to the child's stdin, in prompt order
///
/// Stdin stays open afterwards so the driver keeps running until the
/// supervisor closes it.
pub async fn seed_credentials(child: &mut Child, request: &LaunchRequest) -> Result<(), VpnError> {
    let stdin = child
        .stdin
        .as_mut()
        .ok_or_else(|| VpnError::ProcessSpawnError("driver stdin is not piped".to_string()))?;

    let mut payload = String::new();
    for line in [
        request.elevation_credential.expose_secret().as_str(),
        request.username.as_str(),
        request.password.expose_secret().as_str(),
    ] {
        payload.push_str(line);
        payload.push('\n');
    }
    let payload = SecretString::new(payload);

    stdin
        .write_all(payload.expose_secret().as_bytes())
        .await
        .map_err(|e| VpnError::ProcessSpawnError(format!("failed to seed credentials: {}", e)))?;
    stdin
        .flush()
        .await
        .map_err(|e| VpnError::ProcessSpawnError(format!("failed to seed credentials: {}", e)))?;
    Ok(())
}
