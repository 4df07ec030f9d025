//! Journal Vault - Workspace Staging
//!
//! The storage engine can only work on a file of its own, not on a payload
//! embedded behind our salt header. Staging gives it one: the payload is
//! copied to a private `.tmp` sibling of the vault, the engine works on that
//! copy, and checkpoints fold the copy back into the vault file.
//!
//! The canonical vault file is never written in place. Every write goes to a
//! `.partial` sibling which is fsynced and renamed over the original.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::codec::{self, Salt};
use crate::error::VaultResult;

/// Suffix of the engine's working copy
pub const STAGING_SUFFIX: &str = ".tmp";

/// Suffix used while atomically replacing the vault file
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Staging area for one vault file.
#[derive(Debug, Clone)]
pub struct StagingArea {
    /// Engine working copy
    path: PathBuf,
    /// Engine-owned files living next to the working copy
    sidecars: Vec<PathBuf>,
}

impl StagingArea {
    /// Staging area next to `vault_path`; `sidecar_suffixes` are the engine's
    /// extra files (e.g. `-wal`) that belong to the working copy.
    pub fn for_vault(vault_path: &Path, sidecar_suffixes: &[&str]) -> Self {
        let path = with_suffix(vault_path, STAGING_SUFFIX);
        let sidecars = sidecar_suffixes
            .iter()
            .map(|suffix| with_suffix(&path, suffix))
            .collect();
        Self { path, sidecars }
    }

    /// Path the engine opens
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether any part of a working copy is on disk
    pub fn exists(&self) -> bool {
        self.path.exists() || self.sidecars.iter().any(|p| p.exists())
    }

    /// Write `payload` to a fresh owner-only working copy.
    ///
    /// Leftovers from an unclean shutdown are removed first, sidecars
    /// included: a stale write-ahead log must never be replayed onto a
    /// payload it doesn't belong to.
    pub fn materialize(&self, payload: &[u8]) -> VaultResult<PathBuf> {
        if self.exists() {
            tracing::warn!(path = %self.path.display(), "removing stale staging artifact");
            self.remove_all()?;
        }

        let written = write_private(&self.path, payload, true);
        if let Err(e) = written {
            self.discard();
            return Err(e.into());
        }

        tracing::debug!(path = %self.path.display(), bytes = payload.len(), "payload staged");
        Ok(self.path.clone())
    }

    /// Fold the working copy back into `vault_path` under `salt`.
    ///
    /// Returns the bytes now durable in the vault file.
    pub fn reconcile(&self, salt: &Salt, vault_path: &Path) -> VaultResult<Vec<u8>> {
        let mut payload = Vec::new();
        File::open(&self.path)?.read_to_end(&mut payload)?;

        let raw = codec::join(salt, &payload);
        atomic_write(vault_path, &raw)?;

        tracing::debug!(path = %vault_path.display(), bytes = raw.len(), "staging reconciled");
        Ok(raw)
    }

    /// Best-effort removal of the working copy and its sidecars.
    pub fn discard(&self) {
        if let Err(e) = self.remove_all() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to discard staging artifact");
        }
    }

    fn remove_all(&self) -> io::Result<()> {
        let mut first_err = None;
        for path in std::iter::once(&self.path).chain(self.sidecars.iter()) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Replace `path` with `data` without ever exposing a half-written file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = with_suffix(path, PARTIAL_SUFFIX);

    if let Err(e) = write_private(&temp_path, data, false) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    // Rename to final path (atomic on POSIX filesystems)
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    sync_parent_dir(path)
}

/// Create the vault directory with owner-only permissions if it is missing.
pub fn ensure_private_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

/// `path` with `suffix` appended to the full file name (`a.vault` -> `a.vault.tmp`)
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_private(path: &Path, data: &[u8], exclusive: bool) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if exclusive {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
