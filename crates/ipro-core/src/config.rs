//! Configuration management for ipro.
//!
//! Loads configuration from ${IPRO_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for ipro configuration and data files.
    //!
    //! IPRO_HOME resolution order:
    //! 1. IPRO_HOME environment variable (if set)
    //! 2. ~/.config/ipro (default)

    use std::path::PathBuf;

    /// Returns the ipro home directory.
    pub fn ipro_home() -> PathBuf {
        if let Ok(home) = std::env::var("IPRO_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".ipro"),
            |h| h.join(".config").join("ipro"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        ipro_home().join("config.toml")
    }

    /// Returns the path to the secure credential file.
    pub fn credentials_path() -> PathBuf {
        ipro_home().join("credentials.json")
    }

    /// Returns the path to the general key-value storage file.
    pub fn storage_path() -> PathBuf {
        ipro_home().join("storage.json")
    }

    /// Returns the directory that receives log files.
    pub fn logs_dir() -> PathBuf {
        ipro_home().join("logs")
    }
}

/// Backend API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    /// Request timeout in seconds (0 disables)
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: ApiConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    pub const DEFAULT_BASE_URL: &str = "https://ems-ma.ideassionlive.in/api";
    const DEFAULT_TIMEOUT_SECS: u64 = 10;

    /// Resolves the base URL with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the resolved URL is malformed.
    pub fn effective_base_url(&self) -> Result<String> {
        resolve_url(
            self.base_url.as_deref(),
            "IPRO_BASE_URL",
            Self::DEFAULT_BASE_URL,
            "API",
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Identity provider (Microsoft Entra ID) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub authority: Option<String>,
    pub client_id: String,
    pub scopes: Vec<String>,
    /// Loopback port for the OAuth redirect. 0 picks a random high port.
    pub callback_port: u16,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            authority: None,
            client_id: IdentityConfig::DEFAULT_CLIENT_ID.to_string(),
            scopes: IdentityConfig::DEFAULT_SCOPES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            callback_port: 0,
        }
    }
}

impl IdentityConfig {
    pub const DEFAULT_AUTHORITY: &str =
        "https://login.microsoftonline.com/db01513b-9352-48dc-9232-8fc9f4e6979f";
    const DEFAULT_CLIENT_ID: &str = "386c866e-eeb8-48c2-841a-9d8dfe88606f";
    const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email", "User.Read"];

    /// Resolves the authority with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the resolved URL is malformed.
    pub fn effective_authority(&self) -> Result<String> {
        resolve_url(
            self.authority.as_deref(),
            "IPRO_AUTHORITY_URL",
            Self::DEFAULT_AUTHORITY,
            "identity authority",
        )
    }
}

/// Position lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Label recorded with every submitted attendance event.
    pub label: String,
    /// Command printing the current position as `lat,lon`.
    pub command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            label: LocationConfig::DEFAULT_LABEL.to_string(),
            command: None,
            timeout_secs: LocationConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl LocationConfig {
    const DEFAULT_LABEL: &str = "Chennai";
    const DEFAULT_TIMEOUT_SECS: u64 = 15;

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub identity: IdentityConfig,
    pub location: LocationConfig,
}

impl Config {
    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    ///
    /// # Errors
    /// Returns an error if the file exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Resolves a URL with precedence: env > config > default.
fn resolve_url(
    config_value: Option<&str>,
    env_var: &str,
    default_url: &str,
    name: &str,
) -> Result<String> {
    let candidate = std::env::var(env_var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            config_value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        });

    match candidate {
        Some(url) => {
            url::Url::parse(&url).with_context(|| format!("Invalid {name} URL: {url}"))?;
            Ok(url.trim_end_matches('/').to_string())
        }
        None => Ok(default_url.to_string()),
    }
}
