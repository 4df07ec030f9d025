//! Journal Vault - Single-File Container Codec
//!
//! On-disk layout, bit-exact:
//!
//! ```text
//! vault_file := salt (16 bytes, raw) || engine_payload (remaining bytes)
//! ```
//!
//! There is no version byte or checksum. The payload is authenticated by the
//! storage engine itself; the salt is public.

use journal_keyvault::SALT_LEN;

use crate::error::{VaultError, VaultResult};

/// Header size in bytes
pub const HEADER_LEN: usize = SALT_LEN;

/// Per-vault salt, fixed for the life of the vault
pub type Salt = [u8; SALT_LEN];

/// Split a raw vault file into its salt and engine payload.
pub fn split(raw: &[u8]) -> VaultResult<(Salt, &[u8])> {
    if raw.len() < HEADER_LEN {
        return Err(VaultError::CorruptContainer(format!(
            "file is {} bytes, header needs {}",
            raw.len(),
            HEADER_LEN
        )));
    }

    let (header, payload) = raw.split_at(HEADER_LEN);
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(header);
    Ok((salt, payload))
}

/// Assemble a raw vault file from a salt and engine payload.
pub fn join(salt: &Salt, payload: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(HEADER_LEN + payload.len());
    raw.extend_from_slice(salt);
    raw.extend_from_slice(payload);
    raw
}
