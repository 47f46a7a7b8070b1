//! Local persistence: secure credential store and general key-value storage.
//!
//! The secure store keeps the backend session token in
//! `<home>/credentials.json` with restricted permissions (0600). The general
//! store keeps non-secret values (the cached user profile) in
//! `<home>/storage.json`. Tokens are never logged or displayed in full.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::paths;

/// A credential entry in the secure store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSecret {
    pub account: String,
    pub secret: String,
}

/// OS-style secure credential storage keyed by service name.
pub trait SecretStore: Send + Sync {
    /// Reads the credential for `service`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn get(&self, service: &str) -> Result<Option<StoredSecret>>;

    /// Writes (or replaces) the credential for `service`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn set(&self, service: &str, secret: StoredSecret) -> Result<()>;

    /// Removes the credential for `service`. Returns whether one existed.
    ///
    /// # Errors
    /// Returns an error if the store cannot be written.
    fn remove(&self, service: &str) -> Result<bool>;
}

/// General (non-secret) string storage.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    /// Returns an error if the store cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// # Errors
    /// Returns an error if the store cannot be written.
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// Secure store backed by a JSON file with 0600 permissions.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, StoredSecret>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read credentials from {}", self.path.display())
        })?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents).with_context(|| {
            format!("Failed to parse credentials from {}", self.path.display())
        })
    }

    fn save(&self, entries: &HashMap<String, StoredSecret>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(entries).context("Failed to serialize credentials")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            // mode() only applies on create; tighten files that predate us
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict {}", self.path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        #[cfg(not(unix))]
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, service: &str) -> Result<Option<StoredSecret>> {
        Ok(self.load()?.remove(service))
    }

    fn set(&self, service: &str, secret: StoredSecret) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(service.to_string(), secret);
        self.save(&entries)
    }

    fn remove(&self, service: &str) -> Result<bool> {
        let mut entries = self.load()?;
        let existed = entries.remove(service).is_some();
        if existed {
            self.save(&entries)?;
        }
        Ok(existed)
    }
}

/// Key-value store backed by a JSON object file.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    path: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read storage from {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse storage from {}", self.path.display()))
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(entries).context("Failed to serialize storage")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write to {}", self.path.display()))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// In-memory secure store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, StoredSecret>>,
}

impl SecretStore for MemorySecretStore {
    fn get(&self, service: &str) -> Result<Option<StoredSecret>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("secret store lock poisoned: {e}"))?;
        Ok(entries.get(service).cloned())
    }

    fn set(&self, service: &str, secret: StoredSecret) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("secret store lock poisoned: {e}"))?;
        entries.insert(service.to_string(), secret);
        Ok(())
    }

    fn remove(&self, service: &str) -> Result<bool> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("secret store lock poisoned: {e}"))?;
        Ok(entries.remove(service).is_some())
    }
}

/// In-memory key-value store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("storage lock poisoned: {e}"))?;
        Ok(entries.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("storage lock poisoned: {e}"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("storage lock poisoned: {e}"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Adapter over the two stores holding the session token and cached profile.
#[derive(Clone)]
pub struct CredentialStore {
    secrets: Arc<dyn SecretStore>,
    storage: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Secure-store service name for the backend session token.
    pub const SERVICE: &str = "ipro_backend_service";
    const ACCOUNT: &str = "backend_token";
    /// General-storage key for the serialized user profile.
    pub const PROFILE_KEY: &str = "user_profile";

    pub fn new(secrets: Arc<dyn SecretStore>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self { secrets, storage }
    }

    /// File-backed stores under `IPRO_HOME`.
    pub fn from_home() -> Self {
        Self::new(
            Arc::new(FileSecretStore::new(paths::credentials_path())),
            Arc::new(FileKeyValueStore::new(paths::storage_path())),
        )
    }

    /// In-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemorySecretStore::default()),
            Arc::new(MemoryKeyValueStore::default()),
        )
    }

    /// # Errors
    /// Returns an error if the secure store cannot be read.
    pub fn session_token(&self) -> Result<Option<String>> {
        Ok(self
            .secrets
            .get(Self::SERVICE)?
            .map(|s| s.secret)
            .filter(|s| !s.is_empty()))
    }

    /// # Errors
    /// Returns an error if the secure store cannot be written.
    pub fn save_session_token(&self, token: &str) -> Result<()> {
        self.secrets.set(
            Self::SERVICE,
            StoredSecret {
                account: Self::ACCOUNT.to_string(),
                secret: token.to_string(),
            },
        )
    }

    /// # Errors
    /// Returns an error if the secure store cannot be written.
    pub fn clear_session_token(&self) -> Result<bool> {
        self.secrets.remove(Self::SERVICE)
    }

    /// # Errors
    /// Returns an error if general storage cannot be read.
    pub fn profile_json(&self) -> Result<Option<String>> {
        self.storage.get_item(Self::PROFILE_KEY)
    }

    /// # Errors
    /// Returns an error if general storage cannot be written.
    pub fn save_profile_json(&self, json: &str) -> Result<()> {
        self.storage.set_item(Self::PROFILE_KEY, json)
    }

    /// # Errors
    /// Returns an error if general storage cannot be written.
    pub fn clear_profile(&self) -> Result<()> {
        self.storage.remove_item(Self::PROFILE_KEY)
    }
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.len() <= 16 || !token.is_char_boundary(12) {
        return "***".to_string();
    }
    format!("{}...", &token[..12])
}
