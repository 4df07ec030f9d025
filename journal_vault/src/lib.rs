//! # Journal Vault
//!
//! Passphrase-protected, single-file encrypted journals.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     JOURNAL VAULT                        │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │ VAULT STORE │  │  SESSIONS   │  │   AUTO-SAVE     │  │
//! │  │ create/open │  │ one per name│  │ periodic ckpt   │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬────────┘  │
//! │         │                │                   │           │
//! │  ┌──────┴────────────────┴───────────────────┴────────┐ │
//! │  │           JOURNAL_KEYVAULT (Argon2id KDF)           │ │
//! │  │        passphrase + salt → 256-bit engine key       │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! │                                                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  REGISTRY   │  │  STAGING    │  │  SQLCIPHER      │  │
//! │  │ <name>.vault│  │ working copy│  │  ENGINE         │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Vault File
//!
//! `salt (16 bytes) || SQLCipher database image`. The engine encrypts
//! pages with a key derived from the passphrase and the stored salt;
//! nothing else in the file identifies it.
//!
//! ## Security Model
//!
//! - Raw-key SQLCipher, key derived with Argon2id
//! - Wrong passphrase detected by a probe query, never by a stored hash
//! - Working copy and vault directory are owner-only
//! - Vault file replaced atomically on every checkpoint
//! - Key material zeroized after use

pub mod autosave;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod session;
pub mod staging;
pub mod store;

pub use autosave::{run_until_shutdown, shutdown_signal, AutoSaver};
pub use config::StoreConfig;
pub use engine::{EngineError, SqlCipherEngine, StorageEngine};
pub use error::{VaultError, VaultResult};
pub use registry::JournalRegistry;
pub use session::{SessionInfo, SessionState, VaultSession};
pub use store::VaultStore;

pub use journal_keyvault::Argon2Config;

/// Journal Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
