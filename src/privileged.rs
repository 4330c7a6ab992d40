//! Privileged command execution
//!
//! Runs a single command through the elevation helper (`sudo -S` by
//! default). The credential travels only over the helper's stdin; argv is
//! assembled from validated tokens and never passes through a shell.

use crate::error::VpnError;
use crate::platform::PlatformCommands;
use crate::validate::{Pid, RouteDestination};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Helper stderr text meaning the credential was rejected
const INCORRECT_CREDENTIAL_MARKERS: &[&str] = &["Sorry, try again", "incorrect password"];

/// Helper stderr text meaning the target process or route does not exist
const TARGET_NOT_FOUND_MARKERS: &[&str] = &["No such process"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    Success,
    IncorrectCredential,
    TargetNotFound,
    OtherFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivilegedCommandResult {
    pub exit_code: Option<i32>,
    pub classification: Classification,
    pub raw_stderr: String,
}

impl PrivilegedCommandResult {
    pub fn is_success(&self) -> bool {
        self.classification == Classification::Success
    }
}

/// Operations that may be run with elevated privileges
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegedOp {
    KillPid(Pid),
    DeleteRoute(RouteDestination),
}

impl PrivilegedOp {
    fn argv(&self, platform: &dyn PlatformCommands) -> Vec<String> {
        match self {
            PrivilegedOp::KillPid(pid) => platform.kill_command(*pid),
            PrivilegedOp::DeleteRoute(dest) => platform.delete_route_command(dest),
        }
    }
}

/// A command ready for the elevation helper
pub struct PrivilegedCommandRequest {
    argv: Vec<String>,
    credential: SecretString,
}

impl PrivilegedCommandRequest {
    pub fn new(op: &PrivilegedOp, platform: &dyn PlatformCommands, credential: SecretString) -> Self {
        Self {
            argv: op.argv(platform),
            credential,
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Classify a finished helper invocation
///
/// Stderr markers are checked before the exit code, in table order.
pub fn classify(exit_code: Option<i32>, stderr: &str) -> Classification {
    if INCORRECT_CREDENTIAL_MARKERS.iter().any(|m| stderr.contains(m)) {
        Classification::IncorrectCredential
    } else if TARGET_NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
        Classification::TargetNotFound
    } else if exit_code == Some(0) {
        Classification::Success
    } else {
        Classification::OtherFailure
    }
}

/// Runs requests through the elevation helper
pub struct PrivilegedRunner {
    program: PathBuf,
    prefix_args: Vec<String>,
    platform: Box<dyn PlatformCommands>,
}

impl PrivilegedRunner {
    /// `sudo -S -p ""`: read the password from stdin, print no prompt
    pub fn sudo(platform: Box<dyn PlatformCommands>) -> Self {
        Self::with_helper(
            PathBuf::from("sudo"),
            vec!["-S".to_string(), "-p".to_string(), String::new()],
            platform,
        )
    }

    /// Use a custom helper program; the operation argv is appended after `prefix_args`
    pub fn with_helper(
        program: PathBuf,
        prefix_args: Vec<String>,
        platform: Box<dyn PlatformCommands>,
    ) -> Self {
        Self {
            program,
            prefix_args,
            platform,
        }
    }

    /// Terminate a process by pid
    pub async fn kill_process(
        &self,
        pid: &str,
        credential: Option<SecretString>,
    ) -> Result<PrivilegedCommandResult, VpnError> {
        let pid = Pid::parse(pid)?;
        self.run(PrivilegedOp::KillPid(pid), credential).await
    }

    /// Remove a routing table entry
    pub async fn delete_route(
        &self,
        destination: &str,
        credential: Option<SecretString>,
    ) -> Result<PrivilegedCommandResult, VpnError> {
        let destination = RouteDestination::parse(destination)?;
        self.run(PrivilegedOp::DeleteRoute(destination), credential).await
    }

    pub async fn run(
        &self,
        op: PrivilegedOp,
        credential: Option<SecretString>,
    ) -> Result<PrivilegedCommandResult, VpnError> {
        let credential = match credential {
            Some(c) if !c.expose_secret().is_empty() => c,
            _ => return Err(VpnError::CredentialRequired),
        };

        let request = PrivilegedCommandRequest::new(&op, self.platform.as_ref(), credential);
        self.execute(request).await
    }

    async fn execute(
        &self,
        request: PrivilegedCommandRequest,
    ) -> Result<PrivilegedCommandResult, VpnError> {
        info!("Running privileged command: {}", request.argv.join(" "));

        let mut child = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(&request.argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VpnError::ProcessSpawnError(format!("{}: {}", self.program.display(), e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut line = request.credential.expose_secret().clone();
            line.push('\n');
            // The helper may exit before reading (cached credentials); a broken pipe is fine
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                debug!("Helper closed stdin early: {}", e);
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| VpnError::OtherFailure(format!("Failed to wait for helper: {}", e)))?;

        let raw_stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();
        let classification = classify(exit_code, &raw_stderr);

        match classification {
            Classification::Success => info!("Privileged command succeeded"),
            other => warn!("Privileged command finished: {:?} (exit {:?})", other, exit_code),
        }

        Ok(PrivilegedCommandResult {
            exit_code,
            classification,
            raw_stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_priority() {
        assert_eq!(
            classify(Some(1), "Sorry, try again.\nsudo: 1 incorrect password attempt"),
            Classification::IncorrectCredential
        );
        assert_eq!(
            classify(Some(1), "kill: 999999: No such process"),
            Classification::TargetNotFound
        );
        assert_eq!(classify(Some(0), ""), Classification::Success);
        assert_eq!(classify(Some(2), "route: not in table"), Classification::OtherFailure);
        assert_eq!(classify(None, ""), Classification::OtherFailure);
        // Credential marker wins even on exit 0
        assert_eq!(classify(Some(0), "Sorry, try again."), Classification::IncorrectCredential);
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        assert_eq!(classify(Some(1), "sorry, TRY AGAIN"), Classification::OtherFailure);
        assert_eq!(classify(Some(1), "no such process"), Classification::OtherFailure);
    }

    #[cfg(unix)]
    fn sh_runner(script: &str) -> PrivilegedRunner {
        PrivilegedRunner::with_helper(
            PathBuf::from("/bin/sh"),
            vec!["-c".to_string(), script.to_string(), "helper".to_string()],
            crate::platform::current().unwrap(),
        )
    }

    fn secret(s: &str) -> Option<SecretString> {
        Some(SecretString::new(s.to_string()))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_credential_never_spawns() {
        let runner = sh_runner("touch /should/not/run");
        let result = runner.delete_route("10.0.0.0/24", None).await;
        assert_eq!(result, Err(VpnError::CredentialRequired));

        let result = runner.delete_route("10.0.0.0/24", secret("")).await;
        assert_eq!(result, Err(VpnError::CredentialRequired));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_input_rejected_before_spawn() {
        let runner = sh_runner("exit 0");
        let result = runner.kill_process("12; reboot", secret("pw")).await;
        assert!(matches!(result, Err(VpnError::InvalidInput(_))));

        let result = runner.delete_route("10.0.0.0/24; reboot", secret("pw")).await;
        assert!(matches!(result, Err(VpnError::InvalidInput(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_delete_route_incorrect_credential() {
        let runner = sh_runner("cat >/dev/null; echo 'Sorry, try again.' >&2; exit 1");
        let result = runner.delete_route("10.0.0.0/24", secret("wrong")).await.unwrap();
        assert_eq!(result.classification, Classification::IncorrectCredential);
        assert_eq!(result.exit_code, Some(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_target_not_found() {
        let runner = sh_runner("cat >/dev/null; echo \"kill: $3: No such process\" >&2; exit 1");
        let result = runner.kill_process("4242", secret("pw")).await.unwrap();
        assert_eq!(result.classification, Classification::TargetNotFound);
        assert!(result.raw_stderr.contains("4242"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_credential_goes_to_stdin_not_argv() {
        // Succeeds only if stdin carries the password and argv does not
        let script = r#"read pw; [ "$pw" = "s3cret" ] || exit 9; case "$*" in *s3cret*) exit 8;; esac; exit 0"#;
        let runner = sh_runner(script);
        let result = runner.kill_process("4242", secret("s3cret")).await.unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert!(result.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_other_failure_keeps_stderr() {
        let runner = sh_runner("cat >/dev/null; echo 'route: writing to routing socket: not in table' >&2; exit 1");
        let result = runner.delete_route("default", secret("pw")).await.unwrap();
        assert_eq!(result.classification, Classification::OtherFailure);
        assert!(result.raw_stderr.contains("not in table"));
    }

    #[tokio::test]
    async fn test_missing_helper_is_spawn_error() {
        #[cfg(any(target_os = "macos", target_os = "linux"))]
        {
            let runner = PrivilegedRunner::with_helper(
                PathBuf::from("/nonexistent/ocvpn-helper"),
                vec![],
                crate::platform::current().unwrap(),
            );
            let result = runner.kill_process("4242", secret("pw")).await;
            assert!(matches!(result, Err(VpnError::ProcessSpawnError(_))));
        }
    }
}
