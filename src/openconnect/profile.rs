//! Per-attempt connection parameters and openconnect argv construction

use crate::error::VpnError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// VPN protocols openconnect speaks, by their `--protocol=` name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    AnyConnect,
    #[serde(rename = "nc", alias = "juniper-nc", alias = "juniper")]
    JuniperNc,
    #[serde(rename = "gp", alias = "globalprotect")]
    GlobalProtect,
    Pulse,
    F5,
    Fortinet,
    Array,
}

impl Protocol {
    pub const ALL: [Protocol; 7] = [
        Protocol::AnyConnect,
        Protocol::JuniperNc,
        Protocol::GlobalProtect,
        Protocol::Pulse,
        Protocol::F5,
        Protocol::Fortinet,
        Protocol::Array,
    ];

    /// Value passed to `openconnect --protocol=`
    pub fn as_arg(&self) -> &'static str {
        match self {
            Protocol::AnyConnect => "anyconnect",
            Protocol::JuniperNc => "nc",
            Protocol::GlobalProtect => "gp",
            Protocol::Pulse => "pulse",
            Protocol::F5 => "f5",
            Protocol::Fortinet => "fortinet",
            Protocol::Array => "array",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl FromStr for Protocol {
    type Err = VpnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anyconnect" => Ok(Protocol::AnyConnect),
            "nc" | "juniper" | "juniper-nc" => Ok(Protocol::JuniperNc),
            "gp" | "globalprotect" => Ok(Protocol::GlobalProtect),
            "pulse" => Ok(Protocol::Pulse),
            "f5" => Ok(Protocol::F5),
            "fortinet" => Ok(Protocol::Fortinet),
            "array" => Ok(Protocol::Array),
            other => Err(VpnError::InvalidInput(format!("unknown protocol '{}'", other))),
        }
    }
}

/// Everything needed for one connect attempt
///
/// Created by the caller and consumed by `ConnectionSupervisor::connect`.
/// `password` is redacted in `Debug`.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub server: String,
    pub username: String,
    pub password: SecretString,
    pub protocol: Protocol,
    pub auth_group: Option<String>,
    pub server_cert: Option<String>,
}

const PIN_PREFIX: &str = "pin-sha256:";

impl ConnectionConfig {
    pub fn new(server: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            password,
            protocol: Protocol::default(),
            auth_group: None,
            server_cert: None,
        }
    }

    /// Check required fields and the shape of the optional ones
    pub fn validate(&self) -> Result<(), VpnError> {
        let server = self.server.trim();
        if server.is_empty() {
            return Err(VpnError::InvalidInput("server is required".to_string()));
        }
        if server.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(VpnError::InvalidInput(
                "server must not contain whitespace".to_string(),
            ));
        }

        if self.username.trim().is_empty() {
            return Err(VpnError::InvalidInput("username is required".to_string()));
        }
        // Credentials are fed line by line to the driver
        if self.username.chars().any(char::is_control) {
            return Err(VpnError::InvalidInput(
                "username must not contain control characters".to_string(),
            ));
        }

        let password = self.password.expose_secret();
        if password.is_empty() {
            return Err(VpnError::InvalidInput("password is required".to_string()));
        }
        if password.contains(['\n', '\r']) {
            return Err(VpnError::InvalidInput(
                "password must not contain line breaks".to_string(),
            ));
        }

        if let Some(group) = &self.auth_group {
            if group.chars().any(char::is_control) {
                return Err(VpnError::InvalidInput(
                    "auth group must not contain control characters".to_string(),
                ));
            }
        }

        if let Some(pin) = &self.server_cert {
            validate_pin(pin)?;
        }

        Ok(())
    }

    /// Server as an absolute URL; `https://` is added when no scheme is given
    pub fn server_url(&self) -> String {
        let server = self.server.trim();
        if server.contains("://") {
            server.to_string()
        } else {
            format!("https://{}", server)
        }
    }

    /// Trimmed username as typed at the tunnel prompt
    pub fn username(&self) -> &str {
        self.username.trim()
    }

    /// Arguments for openconnect itself. Never contains a credential.
    pub fn tunnel_args(&self, vpnc_script: Option<&Path>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(script) = vpnc_script {
            args.push("-s".to_string());
            args.push(script.display().to_string());
        }
        args.push(format!("--protocol={}", self.protocol.as_arg()));
        args.push(format!("--server={}", self.server_url()));
        if let Some(pin) = &self.server_cert {
            args.push("--servercert".to_string());
            args.push(pin.trim().to_string());
        }
        if let Some(group) = self.auth_group.as_deref().map(str::trim) {
            if !group.is_empty() {
                args.push(format!("--authgroup={}", group));
            }
        }
        args
    }
}

fn validate_pin(pin: &str) -> Result<(), VpnError> {
    let invalid = || {
        VpnError::InvalidInput(format!(
            "server certificate pin must look like {}<base64>",
            PIN_PREFIX
        ))
    };

    let encoded = pin.trim().strip_prefix(PIN_PREFIX).ok_or_else(invalid)?;
    if encoded.is_empty()
        || !encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
    {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(server: &str) -> ConnectionConfig {
        ConnectionConfig::new(server, "alice", SecretString::new("hunter2".to_string()))
    }

    #[test]
    fn test_server_url_normalization() {
        assert_eq!(config("vpn.example.com").server_url(), "https://vpn.example.com");
        assert_eq!(config(" vpn.example.com ").server_url(), "https://vpn.example.com");
        assert_eq!(
            config("https://vpn.example.com/group").server_url(),
            "https://vpn.example.com/group"
        );
        assert_eq!(config("http://10.0.0.1").server_url(), "http://10.0.0.1");
    }

    #[test]
    fn test_protocol_default_and_parse() {
        assert_eq!(Protocol::default(), Protocol::AnyConnect);
        assert_eq!("juniper-nc".parse::<Protocol>().unwrap(), Protocol::JuniperNc);
        assert_eq!("GlobalProtect".parse::<Protocol>().unwrap(), Protocol::GlobalProtect);
        assert_eq!("gp".parse::<Protocol>().unwrap(), Protocol::GlobalProtect);
        assert!(matches!("ipsec".parse::<Protocol>(), Err(VpnError::InvalidInput(_))));
    }

    #[test]
    fn test_protocol_serde_names() {
        assert_eq!(serde_json::to_string(&Protocol::JuniperNc).unwrap(), "\"nc\"");
        assert_eq!(serde_json::to_string(&Protocol::F5).unwrap(), "\"f5\"");
        let parsed: Protocol = serde_json::from_str("\"globalprotect\"").unwrap();
        assert_eq!(parsed, Protocol::GlobalProtect);
        for protocol in Protocol::ALL {
            assert_eq!(protocol.as_arg().parse::<Protocol>().unwrap(), protocol);
        }
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(config("vpn.example.com").validate().is_ok());
        assert!(config("  ").validate().is_err());
        assert!(config("vpn example.com").validate().is_err());

        let mut c = config("vpn.example.com");
        c.username = " ".to_string();
        assert!(c.validate().is_err());

        let mut c = config("vpn.example.com");
        c.password = SecretString::new(String::new());
        assert!(c.validate().is_err());

        let mut c = config("vpn.example.com");
        c.password = SecretString::new("line\nbreak".to_string());
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_pin() {
        let mut c = config("vpn.example.com");
        c.server_cert = Some("pin-sha256:AbC+/12=".to_string());
        assert!(c.validate().is_ok());

        c.server_cert = Some("sha256:AbC".to_string());
        assert!(c.validate().is_err());
        c.server_cert = Some("pin-sha256:".to_string());
        assert!(c.validate().is_err());
        c.server_cert = Some("pin-sha256:abc;rm".to_string());
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_tunnel_args() {
        let mut c = config("vpn.example.com");
        c.protocol = Protocol::GlobalProtect;
        c.auth_group = Some("Staff".to_string());
        c.server_cert = Some("pin-sha256:AbC=".to_string());

        let script = PathBuf::from("/opt/homebrew/etc/vpnc/vpnc-script");
        let args = c.tunnel_args(Some(&script));
        assert_eq!(
            args,
            vec![
                "-s",
                "/opt/homebrew/etc/vpnc/vpnc-script",
                "--protocol=gp",
                "--server=https://vpn.example.com",
                "--servercert",
                "pin-sha256:AbC=",
                "--authgroup=Staff",
            ]
        );
    }

    #[test]
    fn test_tunnel_args_never_carry_credentials() {
        let c = config("vpn.example.com");
        let args = c.tunnel_args(None);
        assert_eq!(args, vec!["--protocol=anyconnect", "--server=https://vpn.example.com"]);
        assert!(args.iter().all(|a| !a.contains("hunter2") && !a.contains("alice")));
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", config("vpn.example.com"));
        assert!(!debug.contains("hunter2"));
    }
}
