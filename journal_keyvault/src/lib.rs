//! # Journal KeyVault
//!
//! Passphrase handling for single-file journal vaults:
//! - Argon2id derivation of the 32-byte vault key
//! - Random salt generation
//! - Zeroizing containers for key material

pub mod crypto;
pub mod error;

// Re-exports
pub use crypto::{generate_salt, Argon2Config, DerivedKey, KeyDeriver, KEY_LEN, SALT_LEN};
pub use error::{KeyVaultError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
