//! Error types for journal key derivation

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyVaultError {
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Secure random source unavailable: {0}")]
    RandomUnavailable(String),
}

pub type Result<T> = std::result::Result<T, KeyVaultError>;
