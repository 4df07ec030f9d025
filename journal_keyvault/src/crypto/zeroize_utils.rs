//! Zeroizing containers for derived key material

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};
use zeroize::Zeroizing;

/// Vault key length (256-bit)
pub const KEY_LEN: usize = 32;

/// 32-byte vault key, wiped from memory on drop.
///
/// Only lives for the duration of an unlocked session and is never written
/// to disk.
pub struct DerivedKey {
    inner: SecretBox<[u8; KEY_LEN]>,
}

impl DerivedKey {
    /// Take ownership of a heap key without copying it.
    pub fn from_box(bytes: Box<[u8; KEY_LEN]>) -> Self {
        Self {
            inner: SecretBox::new(bytes),
        }
    }

    pub fn from_array(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: SecretBox::new(Box::new(bytes)),
        }
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Lowercase hex of the key, wiped on drop.
    ///
    /// Engines that take raw keys as text (SQLCipher's `x'..'` form) need this.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.expose()))
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_encoding() {
        let mut bytes = [0u8; KEY_LEN];
        bytes[0] = 0xab;
        bytes[31] = 0x0f;
        let key = DerivedKey::from_array(bytes);

        let hex = key.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("ab00"));
        assert!(hex.ends_with("000f"));
    }

    #[test]
    fn test_from_box_keeps_bytes() {
        let mut bytes = Box::new([0u8; KEY_LEN]);
        bytes[5] = 0x7f;
        let ptr = bytes.as_ptr();

        let key = DerivedKey::from_box(bytes);
        assert_eq!(key.expose()[5], 0x7f);
        // Same allocation, no copy
        assert_eq!(key.expose().as_ptr(), ptr);
    }

    #[test]
    fn test_debug_redacts() {
        let key = DerivedKey::from_array([0x42; KEY_LEN]);
        let shown = format!("{:?}", key);
        assert!(!shown.contains("42"));
        assert!(shown.contains("REDACTED"));
    }
}
