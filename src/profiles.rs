//! Named connection profiles (`profiles.json`)

use crate::openconnect::{ConnectionConfig, Protocol};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to access profiles: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse profiles: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Profile not found: {0}")]
    NotFound(String),
    #[error("Could not determine data directory")]
    NoDataDir,
    #[error("Keychain error: {0}")]
    KeyringError(#[from] keyring::Error),
}

const KEYRING_SERVICE: &str = "ocvpn";

/// VPN passwords kept in the OS keychain, keyed by profile name
pub struct KeychainPasswords;

impl KeychainPasswords {
    pub fn store(profile: &str, password: &SecretString) -> Result<(), ProfileError> {
        keyring::Entry::new(KEYRING_SERVICE, profile)?.set_password(password.expose_secret())?;
        info!("Stored password for profile {} in keychain", profile);
        Ok(())
    }

    pub fn load(profile: &str) -> Result<Option<SecretString>, ProfileError> {
        match keyring::Entry::new(KEYRING_SERVICE, profile)?.get_password() {
            Ok(password) => Ok(Some(SecretString::new(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Removing a password that was never stored is not an error
    pub fn delete(profile: &str) -> Result<(), ProfileError> {
        match keyring::Entry::new(KEYRING_SERVICE, profile)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub server: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_cert: Option<String>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("protocol", &self.protocol)
            .field("auth_group", &self.auth_group)
            .field("server_cert", &self.server_cert)
            .finish()
    }
}

impl Profile {
    /// Password kept in the profile file itself, for files written by older front-ends
    pub fn stored_password(&self) -> Option<SecretString> {
        self.password
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| SecretString::new(p.clone()))
    }

    /// Build a connect request from this profile
    pub fn to_config(&self, password: SecretString) -> ConnectionConfig {
        ConnectionConfig {
            server: self.server.clone(),
            username: self.username.clone(),
            password,
            protocol: self.protocol,
            auth_group: self.auth_group.clone(),
            server_cert: self.server_cert.clone(),
        }
    }
}

/// JSON file holding a list of profiles
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/ocvpn/profiles.json`
    pub fn default_location() -> Result<Self, ProfileError> {
        let dir = dirs::data_dir().ok_or(ProfileError::NoDataDir)?;
        Ok(Self::new(dir.join("ocvpn").join("profiles.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means no profiles
    pub fn load(&self) -> Result<Vec<Profile>, ProfileError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, profiles: &[Profile]) -> Result<(), ProfileError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(profiles)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Profile, ProfileError> {
        self.load()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ProfileError::NotFound(name.to_string()))
    }

    /// Insert, or replace the profile with the same name in place
    pub fn upsert(&self, profile: Profile) -> Result<(), ProfileError> {
        let mut profiles = self.load()?;
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        self.save(&profiles)?;
        info!("Saved profiles to {}", self.path.display());
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), ProfileError> {
        let mut profiles = self.load()?;
        let before = profiles.len();
        profiles.retain(|p| p.name != name);
        if profiles.len() == before {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        self.save(&profiles)
    }
}
