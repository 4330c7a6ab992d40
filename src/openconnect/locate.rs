//! External binary and script discovery
//!
//! Each lookup walks a fixed, ordered list of well-known install locations
//! and only then falls back to a PATH search.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of `check_binary_presence`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryPresence {
    pub installed: bool,
    pub path: Option<PathBuf>,
}

impl BinaryPresence {
    fn found(path: PathBuf) -> Self {
        Self {
            installed: true,
            path: Some(path),
        }
    }

    fn missing() -> Self {
        Self {
            installed: false,
            path: None,
        }
    }
}

/// Look for `name` in `candidates` (first existing file wins), then on PATH
pub fn check_binary_presence(name: &str, candidates: &[PathBuf]) -> BinaryPresence {
    if let Some(path) = first_existing(candidates) {
        debug!("Found {} at {}", name, path.display());
        return BinaryPresence::found(path);
    }

    match which::which(name) {
        Ok(path) => {
            debug!("Found {} on PATH at {}", name, path.display());
            BinaryPresence::found(path)
        }
        Err(_) => {
            debug!("{} not found", name);
            BinaryPresence::missing()
        }
    }
}

/// First candidate that exists as a regular file
pub fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

/// Ordered search lists for every external dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locations {
    pub openconnect: Vec<PathBuf>,
    pub vpnc_script: Vec<PathBuf>,
    pub expect: Vec<PathBuf>,
    pub driver_script: Vec<PathBuf>,
}

impl Default for Locations {
    fn default() -> Self {
        let home = dirs::home_dir();
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));

        let mut openconnect = vec![
            PathBuf::from("/usr/local/bin/openconnect"),
            PathBuf::from("/opt/homebrew/bin/openconnect"),
        ];
        if let Some(home) = &home {
            openconnect.push(home.join(".local/openconnect/bin/openconnect"));
        }
        if let Some(dir) = &exe_dir {
            openconnect.push(dir.join("bin").join("openconnect"));
        }
        openconnect.push(PathBuf::from("/usr/sbin/openconnect"));
        openconnect.push(PathBuf::from("/usr/bin/openconnect"));

        let mut vpnc_script = vec![
            PathBuf::from("/opt/homebrew/etc/vpnc/vpnc-script"),
            PathBuf::from("/usr/local/etc/vpnc/vpnc-script"),
            PathBuf::from("/opt/homebrew/opt/vpnc-scripts/etc/vpnc/vpnc-script"),
            PathBuf::from("/usr/local/opt/vpnc-scripts/etc/vpnc/vpnc-script"),
        ];
        if let Some(home) = &home {
            vpnc_script.push(home.join(".local/openconnect/etc/vpnc/vpnc-script"));
        }
        vpnc_script.push(PathBuf::from("/usr/share/vpnc-scripts/vpnc-script"));
        vpnc_script.push(PathBuf::from("/etc/vpnc/vpnc-script"));

        let expect = vec![
            PathBuf::from("/usr/bin/expect"),
            PathBuf::from("/opt/homebrew/bin/expect"),
            PathBuf::from("/usr/local/bin/expect"),
        ];

        let mut driver_script = Vec::new();
        if let Some(dir) = &exe_dir {
            driver_script.push(dir.join("vpn-connect.exp"));
            driver_script.push(dir.join("../share/ocvpn/vpn-connect.exp"));
        }
        if let Some(data) = dirs::data_dir() {
            driver_script.push(data.join("ocvpn").join("vpn-connect.exp"));
        }
        driver_script.push(PathBuf::from("scripts/vpn-connect.exp"));

        Self {
            openconnect,
            vpnc_script,
            expect,
            driver_script,
        }
    }
}

impl Locations {
    pub fn openconnect(&self) -> BinaryPresence {
        check_binary_presence("openconnect", &self.openconnect)
    }

    /// vpnc-script is optional; `None` means openconnect uses its built-in default
    pub fn vpnc_script(&self) -> Option<PathBuf> {
        check_binary_presence("vpnc-script", &self.vpnc_script).path
    }

    pub fn expect(&self) -> BinaryPresence {
        check_binary_presence("expect", &self.expect)
    }

    pub fn driver_script(&self) -> Option<PathBuf> {
        first_existing(&self.driver_script)
    }
}
