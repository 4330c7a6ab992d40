//! Input validation for values that reach a privileged or external command
//!
//! Every argv token built from caller input passes through one of these
//! constructors first. The returned newtypes are the only way to obtain a
//! value accepted by `privileged` and `diagnostics::probe`.

use crate::error::VpnError;
use serde::Serialize;
use std::fmt;

/// Maximum length accepted for a probe hostname (DNS limit)
const MAX_HOST_LEN: usize = 253;

/// Process ID, restricted to the positive range of a 32-bit `pid_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Pid(i32);

impl Pid {
    pub fn parse(input: &str) -> Result<Self, VpnError> {
        let value: i32 = input
            .parse()
            .map_err(|_| VpnError::InvalidInput(format!("Invalid PID: {}", input)))?;

        // Round-trip equality rejects signs, leading zeros and whitespace
        if value <= 0 || value.to_string() != input {
            return Err(VpnError::InvalidInput(format!("Invalid PID: {}", input)));
        }

        Ok(Self(value))
    }

    pub fn as_raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hostname, IPv4 or IPv6 literal usable as a connectivity probe target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHost(String);

impl ProbeHost {
    pub fn parse(input: &str) -> Result<Self, VpnError> {
        if input.is_empty() || input.len() > MAX_HOST_LEN {
            return Err(VpnError::InvalidInput(format!("Invalid host: {}", input)));
        }

        for c in input.chars() {
            if !c.is_ascii_alphanumeric() && c != '.' && c != '-' && c != ':' {
                return Err(VpnError::InvalidInput(format!(
                    "Invalid host '{}': contains invalid character '{}'",
                    input, c
                )));
            }
        }

        // Would be read as an option by the probe tool
        if input.starts_with('-') {
            return Err(VpnError::InvalidInput(
                "Host cannot start with dash".to_string(),
            ));
        }

        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProbeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// TCP port in 1..=65535
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port(u16);

impl Port {
    pub fn new(value: u16) -> Result<Self, VpnError> {
        if value == 0 {
            return Err(VpnError::InvalidInput("Port must be between 1 and 65535".into()));
        }
        Ok(Self(value))
    }

    pub fn parse(input: &str) -> Result<Self, VpnError> {
        let value: u16 = input
            .parse()
            .map_err(|_| VpnError::InvalidInput(format!("Invalid port: {}", input)))?;
        Self::new(value)
    }

    pub fn get(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Route destination: `default` or `a.b.c.d[/len]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDestination(String);

impl RouteDestination {
    pub fn parse(input: &str) -> Result<Self, VpnError> {
        if input == "default" || is_ipv4_with_prefix(input) {
            Ok(Self(input.to_string()))
        } else {
            Err(VpnError::InvalidInput(format!(
                "Invalid route destination: {}",
                input
            )))
        }
    }

    pub fn is_default(&self) -> bool {
        self.0 == "default"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_ipv4_with_prefix(input: &str) -> bool {
    let (addr, prefix) = match input.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (input, None),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > 2 || !prefix.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        match prefix.parse::<u8>() {
            Ok(len) if (1..=32).contains(&len) => {}
            _ => return false,
        }
    }

    let octets: Vec<&str> = addr.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|o| {
            !o.is_empty()
                && o.len() <= 3
                && o.chars().all(|c| c.is_ascii_digit())
                && o.parse::<u8>().is_ok()
        })
}
