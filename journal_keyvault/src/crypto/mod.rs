//! Crypto module - Argon2id KDF and zeroizing key containers

mod argon2_kdf;
mod zeroize_utils;

pub use argon2_kdf::{generate_salt, Argon2Config, KeyDeriver, SALT_LEN};
pub use zeroize_utils::{DerivedKey, KEY_LEN};
