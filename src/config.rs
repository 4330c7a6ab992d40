//! Configuration handling for ocvpn

use crate::openconnect::Locations;
use crate::supervisor::SupervisorSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Could not determine config directory")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locations: Locations,
    pub bridge: BridgeConfig,
    pub supervisor: SupervisorConfig,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Explicit driver script, tried before the `locations.driver_script` list
    pub driver_script: Option<PathBuf>,
    /// Seconds the driver waits for each prompt
    pub prompt_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            driver_script: None,
            prompt_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Seconds between interrupt and kill on disconnect
    pub disconnect_grace_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            disconnect_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `$XDG_CONFIG_HOME/ocvpn/config.toml`, else `~/.config/ocvpn/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .or_else(dirs::config_dir)
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("ocvpn").join("config.toml"))
    }

    /// Driver script candidates with the explicit override first
    pub fn driver_script_candidates(&self) -> Vec<PathBuf> {
        self.bridge
            .driver_script
            .iter()
            .cloned()
            .chain(self.locations.driver_script.iter().cloned())
            .collect()
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.prompt_timeout_secs)
    }

    pub fn probe_deadline(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs.max(1))
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            disconnect_grace: Duration::from_secs(self.supervisor.disconnect_grace_secs),
            ..SupervisorSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.supervisor.disconnect_grace_secs, 5);
        assert_eq!(config.probe.timeout_secs, 5);
        assert_eq!(config.bridge.prompt_timeout_secs, 60);
        assert_eq!(config.supervisor_settings().disconnect_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.bridge.driver_script = Some(PathBuf::from("/opt/ocvpn/vpn-connect.exp"));
        config.supervisor.disconnect_grace_secs = 2;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[supervisor]
disconnect_grace_secs = 10

[locations]
openconnect = ["/custom/bin/openconnect"]
"#,
        )
        .unwrap();

        assert_eq!(config.supervisor.disconnect_grace_secs, 10);
        assert_eq!(config.probe.timeout_secs, 5);
        assert_eq!(
            config.locations.openconnect,
            vec![PathBuf::from("/custom/bin/openconnect")]
        );
        assert!(!config.locations.vpnc_script.is_empty());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[supervisor\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_driver_script_override_first() {
        let mut config = Config::default();
        config.bridge.driver_script = Some(PathBuf::from("/override.exp"));
        let candidates = config.driver_script_candidates();
        assert_eq!(candidates[0], PathBuf::from("/override.exp"));
        assert_eq!(candidates.len(), config.locations.driver_script.len() + 1);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NoConfigDir;
        assert_eq!(err.to_string(), "Could not determine config directory");
    }
}
