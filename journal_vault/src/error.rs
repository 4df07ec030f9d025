//! Journal Vault - Error Types

use thiserror::Error;

use journal_keyvault::KeyVaultError;

use crate::engine::EngineError;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // REGISTRY ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Vault not found: {0}")]
    NotFound(String),

    #[error("Vault already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid vault name: {0:?}")]
    InvalidName(String),

    // ═══════════════════════════════════════════════════════════════
    // CONTAINER ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Corrupt vault container: {0}")]
    CorruptContainer(String),

    // ═══════════════════════════════════════════════════════════════
    // SESSION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Wrong passphrase")]
    WrongPassphrase,

    #[error("Vault already unlocked: {0}")]
    AlreadyUnlocked(String),

    #[error("Vault session is locked")]
    Locked,

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO / ENGINE / IO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Storage engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VaultError {
    /// A wrong passphrase is the only error a user can fix by retrying
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, VaultError::WrongPassphrase)
    }
}

impl From<KeyVaultError> for VaultError {
    fn from(e: KeyVaultError) -> Self {
        VaultError::Derivation(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Config(e.to_string())
    }
}
