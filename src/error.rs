//! Error taxonomy shared by every boundary operation
//!
//! Validation and precondition failures are returned synchronously.
//! Tunnel lifecycle failures are also pushed as `ConnectionError` events.
//! No variant ever carries a credential.

use crate::platform::PlatformError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which of the two credentials was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    /// Local administrator (sudo) password
    Elevation,
    /// VPN username/password
    Tunnel,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::Elevation => write!(f, "incorrect administrator password"),
            AuthFailure::Tunnel => write!(f, "VPN server rejected the username or password"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VpnError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Already connected or connecting")]
    AlreadyActive,
    #[error("Not connected")]
    NotConnected,
    #[error("Administrator password required")]
    CredentialRequired,
    #[error("Driver script not found: {0}")]
    ScriptNotFound(String),
    #[error("{0} is not installed")]
    BinaryNotFound(String),
    #[error("Failed to start process: {0}")]
    ProcessSpawnError(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(AuthFailure),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("{0}")]
    OtherFailure(String),
}

/// Machine-readable discriminant for `{error, kind}` replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidInput,
    AlreadyActive,
    NotConnected,
    CredentialRequired,
    ScriptNotFound,
    BinaryNotFound,
    ProcessSpawnError,
    AuthenticationFailed,
    Timeout,
    OtherFailure,
}

impl VpnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VpnError::InvalidInput(_) => ErrorKind::InvalidInput,
            VpnError::AlreadyActive => ErrorKind::AlreadyActive,
            VpnError::NotConnected => ErrorKind::NotConnected,
            VpnError::CredentialRequired => ErrorKind::CredentialRequired,
            VpnError::ScriptNotFound(_) => ErrorKind::ScriptNotFound,
            VpnError::BinaryNotFound(_) => ErrorKind::BinaryNotFound,
            VpnError::ProcessSpawnError(_) => ErrorKind::ProcessSpawnError,
            VpnError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            VpnError::Timeout(_) => ErrorKind::Timeout,
            VpnError::OtherFailure(_) => ErrorKind::OtherFailure,
        }
    }
}

impl From<PlatformError> for VpnError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::SpawnError(msg) => VpnError::ProcessSpawnError(msg),
            other => VpnError::OtherFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            VpnError::AlreadyActive.to_string(),
            "Already connected or connecting"
        );
        assert_eq!(
            VpnError::AuthenticationFailed(AuthFailure::Elevation).to_string(),
            "Authentication failed: incorrect administrator password"
        );
        assert!(VpnError::BinaryNotFound("openconnect".into())
            .to_string()
            .contains("openconnect"));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(VpnError::NotConnected.kind(), ErrorKind::NotConnected);
        assert_eq!(
            VpnError::Timeout("probe".into()).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            VpnError::AuthenticationFailed(AuthFailure::Tunnel).kind(),
            ErrorKind::AuthenticationFailed
        );
    }

    #[test]
    fn test_from_platform_error() {
        let err: VpnError = PlatformError::SpawnError("no such file".into()).into();
        assert_eq!(err.kind(), ErrorKind::ProcessSpawnError);

        let err: VpnError = PlatformError::UnsupportedPlatform.into();
        assert_eq!(err.kind(), ErrorKind::OtherFailure);
    }
}
