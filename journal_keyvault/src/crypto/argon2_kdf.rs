//! Argon2id KDF for deriving the vault key from a passphrase

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::zeroize_utils::{DerivedKey, KEY_LEN};
use crate::error::{KeyVaultError, Result};

/// Salt length stored in every vault header
pub const SALT_LEN: usize = 16;

/// Argon2id configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Config {
    /// Iterations (time cost)
    pub time_cost: u32,
    /// Memory in KiB
    pub memory_cost_kib: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_cost_kib: 64 * 1024, // 64 MiB
            parallelism: 2,
        }
    }
}

impl Argon2Config {
    /// Configuration for constrained devices
    pub fn low_memory() -> Self {
        Self {
            time_cost: 4,
            memory_cost_kib: 16 * 1024, // 16 MiB
            parallelism: 1,
        }
    }

    /// Configuration for strong machines
    pub fn high_security() -> Self {
        Self {
            time_cost: 4,
            memory_cost_kib: 256 * 1024, // 256 MiB
            parallelism: 4,
        }
    }

    /// Rough derivation time estimate (ms)
    pub fn estimated_time_ms(&self) -> u64 {
        let base = 50u64;
        let mem_factor = u64::from(self.memory_cost_kib) / 1024;
        let time_factor = u64::from(self.time_cost);
        base * time_factor * mem_factor / u64::from(self.parallelism.max(1))
    }

    fn params(&self) -> Result<Params> {
        Params::new(
            self.memory_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| KeyVaultError::KeyDerivationFailed(format!("Invalid Argon2 params: {}", e)))
    }
}

/// Turns a passphrase and a vault salt into the 32-byte vault key.
///
/// Derivation never fails because a passphrase is wrong; whether the key
/// actually opens a vault is only known once the storage engine tries it.
#[derive(Debug, Clone, Default)]
pub struct KeyDeriver {
    config: Argon2Config,
}

impl KeyDeriver {
    pub fn new(config: Argon2Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Argon2Config {
        &self.config
    }

    /// Derives the vault key. Same (passphrase, salt) always yields the same key.
    pub fn derive(&self, passphrase: &SecretString, salt: &[u8]) -> Result<DerivedKey> {
        if salt.is_empty() {
            return Err(KeyVaultError::KeyDerivationFailed("empty salt".into()));
        }

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.config.params()?);

        // Hashed in place on the heap; the buffer is wiped if hashing fails
        let mut output: Zeroizing<Box<[u8; KEY_LEN]>> = Zeroizing::new(Box::default());
        argon2
            .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut output[..])
            .map_err(|e| KeyVaultError::KeyDerivationFailed(format!("Hashing failed: {}", e)))?;

        tracing::debug!(
            memory_kib = self.config.memory_cost_kib,
            passes = self.config.time_cost,
            "derived vault key"
        );
        Ok(DerivedKey::from_box(std::mem::take(&mut *output)))
    }
}

/// Generates a fresh random salt from the OS RNG
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt)
        .map_err(|e| KeyVaultError::RandomUnavailable(e.to_string()))?;
    Ok(salt)
}
