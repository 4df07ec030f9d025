//! Journal Vault - Store Configuration
//!
//! Sources, later wins: defaults, JSON config file, environment, CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use journal_keyvault::Argon2Config;

use crate::error::{VaultError, VaultResult};

/// Directory holding the vault files
pub const ENV_VAULT_DIR: &str = "JOURNAL_VAULT_DIR";

/// Auto-save period in seconds
pub const ENV_AUTOSAVE_SECS: &str = "JOURNAL_VAULT_AUTOSAVE_SECS";

pub const DEFAULT_AUTOSAVE_SECS: u64 = 30;

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where vault files live
    pub vault_dir: PathBuf,
    /// Background checkpoint period while a vault is unlocked
    pub autosave_interval_secs: u64,
    /// Key derivation cost. Must match the one the vault was created with.
    pub kdf: Argon2Config,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            autosave_interval_secs: DEFAULT_AUTOSAVE_SECS,
            kdf: Argon2Config::default(),
        }
    }
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(vault_dir: P) -> Self {
        Self {
            vault_dir: vault_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Read a JSON config file; missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            VaultError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let config: StoreConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> VaultResult<Self> {
        Self::default().with_env()
    }

    /// Apply `JOURNAL_VAULT_DIR` / `JOURNAL_VAULT_AUTOSAVE_SECS` if set.
    pub fn with_env(self) -> VaultResult<Self> {
        self.with_overrides(
            std::env::var(ENV_VAULT_DIR).ok(),
            std::env::var(ENV_AUTOSAVE_SECS).ok(),
        )
    }

    fn with_overrides(
        mut self,
        vault_dir: Option<String>,
        autosave_secs: Option<String>,
    ) -> VaultResult<Self> {
        if let Some(dir) = vault_dir.filter(|d| !d.trim().is_empty()) {
            self.vault_dir = PathBuf::from(dir);
        }
        if let Some(secs) = autosave_secs {
            self.autosave_interval_secs = secs.trim().parse().map_err(|_| {
                VaultError::Config(format!("{} must be a number of seconds, got {:?}", ENV_AUTOSAVE_SECS, secs))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.autosave_interval_secs == 0 {
            return Err(VaultError::Config("autosave interval must be at least 1 second".into()));
        }
        if self.vault_dir.as_os_str().is_empty() {
            return Err(VaultError::Config("vault directory is empty".into()));
        }
        Ok(())
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }
}

/// `<data dir>/journal-vault/vaults`, or `./vaults` when the platform has none
pub fn default_vault_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("journal-vault").join("vaults"))
        .unwrap_or_else(|| PathBuf::from("./vaults"))
}
