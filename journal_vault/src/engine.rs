//! Journal Vault - Storage Engine
//!
//! The vault only needs a handful of capabilities from the embedded
//! database: open a file under a key, prove the key is right, flush, close.
//! [`StorageEngine`] names them so the container and session code never
//! touch engine internals. [`SqlCipherEngine`] is the production engine.
//!
//! # SQLCipher flow
//!
//! 1. **Open** the staged file. Nothing is read yet.
//! 2. **Key** with `PRAGMA key = "x'<hex>'"`. The `x'..'` form hands SQLCipher
//!    the derived key as a raw key, so its built-in PBKDF2 is skipped.
//! 3. **Probe** with `SELECT count(*) FROM sqlite_master`. With a wrong key
//!    the first page fails its HMAC and SQLite reports `SQLITE_NOTADB`.
//! 4. **Configure** WAL, `synchronous = FULL` and foreign keys.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use journal_keyvault::DerivedKey;

/// Format version written into `vault_meta`
pub const STORE_FORMAT_VERSION: i64 = 1;

/// Engine-level failures
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("sqlcipher not available in this build")]
    CipherUnavailable,

    #[error("write-ahead log checkpoint could not complete")]
    CheckpointBusy,
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Capabilities the vault needs from an embedded encrypted database.
pub trait StorageEngine: Send + Sync + 'static {
    /// Live handle handed to callers while a vault is unlocked
    type Connection: Send + 'static;

    /// Files the engine keeps next to its database file
    const SIDECAR_SUFFIXES: &'static [&'static str];

    /// Open `path` and apply `key`. Must not read the database yet.
    fn open_with_key(&self, path: &Path, key: &DerivedKey) -> EngineResult<Self::Connection>;

    /// Minimal read proving the key decrypts the database.
    fn probe(&self, conn: &Self::Connection) -> EngineResult<()>;

    /// Session settings, applied once the probe has passed.
    fn configure(&self, conn: &Self::Connection) -> EngineResult<()>;

    /// Baseline schema and seed data for a brand new vault.
    fn initialize(&self, conn: &Self::Connection) -> EngineResult<()>;

    /// Push all committed state into the database file itself.
    fn flush(&self, conn: &Self::Connection) -> EngineResult<()>;

    /// Release the handle.
    fn close(&self, conn: Self::Connection) -> EngineResult<()>;

    /// Engine self-check of the stored pages.
    fn integrity_check(&self, conn: &Self::Connection) -> EngineResult<bool>;
}

/// SQLCipher through `rusqlite`.
#[derive(Debug, Clone)]
pub struct SqlCipherEngine {
    /// Application schema run once at vault creation
    schema: Option<String>,
}

impl Default for SqlCipherEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlCipherEngine {
    pub fn new() -> Self {
        Self { schema: None }
    }

    /// Engine that also runs `sql` when a vault is created.
    ///
    /// The store treats the schema as opaque; it's the application's tables.
    pub fn with_schema(sql: impl Into<String>) -> Self {
        Self {
            schema: Some(sql.into()),
        }
    }
}

impl StorageEngine for SqlCipherEngine {
    type Connection = Connection;

    const SIDECAR_SUFFIXES: &'static [&'static str] = &["-wal", "-shm", "-journal"];

    fn open_with_key(&self, path: &Path, key: &DerivedKey) -> EngineResult<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;

        let key_hex = key.to_hex();
        let pragma = zeroize::Zeroizing::new(format!("PRAGMA key = \"x'{}'\";", key_hex.as_str()));
        conn.execute_batch(&pragma)?;

        // A plain SQLite build silently ignores PRAGMA key
        let cipher_version: Option<String> = conn
            .query_row("PRAGMA cipher_version;", [], |row| row.get(0))
            .ok();
        if cipher_version.map_or(true, |v| v.trim().is_empty()) {
            return Err(EngineError::CipherUnavailable);
        }

        Ok(conn)
    }

    fn probe(&self, conn: &Connection) -> EngineResult<()> {
        conn.query_row("SELECT count(*) FROM sqlite_master;", [], |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(())
    }

    fn configure(&self, conn: &Connection) -> EngineResult<()> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA secure_delete = ON;",
        )?;
        Ok(())
    }

    fn initialize(&self, conn: &Connection) -> EngineResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vault_meta (
                format_version INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        conn.execute(
            "INSERT INTO vault_meta (format_version, created_at) VALUES (?1, ?2)",
            rusqlite::params![STORE_FORMAT_VERSION, chrono::Utc::now().to_rfc3339()],
        )?;

        if let Some(ref schema) = self.schema {
            conn.execute_batch(schema)?;
        }
        Ok(())
    }

    fn flush(&self, conn: &Connection) -> EngineResult<()> {
        // (busy, wal frames, frames checkpointed)
        let busy: i64 = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |row| row.get(0))?;
        if busy != 0 {
            return Err(EngineError::CheckpointBusy);
        }
        Ok(())
    }

    fn close(&self, conn: Connection) -> EngineResult<()> {
        conn.close().map_err(|(_, e)| EngineError::Sqlite(e))
    }

    fn integrity_check(&self, conn: &Connection) -> EngineResult<bool> {
        let result: String = conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0))?;
        Ok(result.trim() == "ok")
    }
}
