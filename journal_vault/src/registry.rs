//! Journal Vault - Journal Registry
//!
//! One vault per file, `<name>.vault`, in a single directory. There is no
//! index file: listing always reads the directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use secrecy::SecretString;

use journal_keyvault::{generate_salt, DerivedKey, KeyDeriver};

use crate::engine::{EngineResult, StorageEngine};
use crate::error::{VaultError, VaultResult};
use crate::session::close_quietly;
use crate::staging::{ensure_private_dir, StagingArea};

/// File extension of vault containers
pub const VAULT_EXTENSION: &str = "vault";

/// Directory of named vaults
#[derive(Debug, Clone)]
pub struct JournalRegistry {
    root: PathBuf,
}

impl JournalRegistry {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map every character outside `[A-Za-z0-9_-]` to `_`.
    pub fn sanitize_name(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Sanitized name and vault path for a user-supplied name.
    ///
    /// The path is always a direct child of the vault directory.
    pub fn resolve(&self, name: &str) -> VaultResult<(String, PathBuf)> {
        let safe = Self::sanitize_name(name);
        if safe.is_empty() {
            return Err(VaultError::InvalidName(name.to_string()));
        }
        let path = self.root.join(format!("{}.{}", safe, VAULT_EXTENSION));
        Ok((safe, path))
    }

    pub fn path_for(&self, name: &str) -> VaultResult<PathBuf> {
        self.resolve(name).map(|(_, path)| path)
    }

    pub fn exists(&self, name: &str) -> VaultResult<bool> {
        Ok(self.path_for(name)?.is_file())
    }

    /// Sorted names of all vaults in the directory.
    pub fn list(&self) -> VaultResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VAULT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.is_empty() && Self::sanitize_name(stem) == stem {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Create a new vault holding an initialized, empty engine database.
    pub fn create<E: StorageEngine>(
        &self,
        name: &str,
        passphrase: &SecretString,
        deriver: &KeyDeriver,
        engine: &E,
    ) -> VaultResult<PathBuf> {
        let (safe, path) = self.resolve(name)?;
        if path.exists() {
            return Err(VaultError::AlreadyExists(safe));
        }

        ensure_private_dir(&self.root)?;

        let salt = generate_salt()?;
        let key = deriver.derive(passphrase, &salt)?;

        let staging = StagingArea::for_vault(&path, E::SIDECAR_SUFFIXES);
        staging.materialize(&[])?;

        let built = build_payload(engine, staging.path(), &key)
            .map_err(VaultError::from)
            .and_then(|()| staging.reconcile(&salt, &path));
        staging.discard();
        built?;

        tracing::info!(vault = %safe, path = %path.display(), "vault created");
        Ok(path)
    }

    /// Delete a vault file and any leftover working copy.
    pub fn remove(&self, name: &str, sidecar_suffixes: &[&str]) -> VaultResult<()> {
        let (safe, path) = self.resolve(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(safe));
            }
            Err(e) => return Err(e.into()),
        }
        StagingArea::for_vault(&path, sidecar_suffixes).discard();

        tracing::info!(vault = %safe, "vault removed");
        Ok(())
    }
}

/// Key an empty database, lay down the baseline schema, flush, close.
fn build_payload<E: StorageEngine>(engine: &E, path: &Path, key: &DerivedKey) -> EngineResult<()> {
    let conn = engine.open_with_key(path, key)?;

    let prepared = engine
        .configure(&conn)
        .and_then(|()| engine.initialize(&conn))
        .and_then(|()| engine.flush(&conn));
    if let Err(e) = prepared {
        close_quietly(engine, conn);
        return Err(e);
    }

    engine.close(conn)
}
