//! Journal Vault - Vault Sessions
//!
//! A [`VaultSession`] is one unlocked vault: the staged working copy, the live
//! engine handle keyed with the derived key, and the salt needed to fold the
//! working copy back into the vault file.
//!
//! Lifecycle: `Locked -> Unlocking -> Unlocked -> Locking -> Locked`.
//! [`ActiveVaults`] tracks which names are past `Locked` so a vault can only
//! have one session at a time.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use journal_keyvault::KeyDeriver;

use crate::codec::{self, Salt};
use crate::engine::{SqlCipherEngine, StorageEngine};
use crate::error::{VaultError, VaultResult};
use crate::staging::StagingArea;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Locked,
    Unlocking,
    Unlocked,
    Locking,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Unlocking => "unlocking",
            Self::Unlocked => "unlocked",
            Self::Locking => "locking",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ACTIVE VAULT REGISTRY
// ═══════════════════════════════════════════════════════════════════════════

/// Names of vaults that are not `Locked`, with their current state.
#[derive(Debug, Clone, Default)]
pub struct ActiveVaults {
    inner: Arc<Mutex<HashMap<String, SessionState>>>,
}

impl ActiveVaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` in the `Unlocking` state.
    pub fn claim(&self, name: &str) -> VaultResult<ActiveClaim> {
        let mut map = self.inner.lock();
        if map.contains_key(name) {
            return Err(VaultError::AlreadyUnlocked(name.to_string()));
        }
        map.insert(name.to_string(), SessionState::Unlocking);

        Ok(ActiveClaim {
            vaults: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn state(&self, name: &str) -> SessionState {
        self.inner
            .lock()
            .get(name)
            .copied()
            .unwrap_or(SessionState::Locked)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Reservation of one vault name; released on drop.
#[derive(Debug)]
pub struct ActiveClaim {
    vaults: ActiveVaults,
    name: String,
}

impl ActiveClaim {
    fn set(&self, state: SessionState) {
        if let Some(slot) = self.vaults.inner.lock().get_mut(&self.name) {
            *slot = state;
        }
    }
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        self.vaults.inner.lock().remove(&self.name);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════════════════

/// Snapshot of a session for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub path: PathBuf,
    pub state: SessionState,
    pub last_checkpoint: Option<DateTime<Utc>>,
    pub checkpoints: u64,
}

#[derive(Debug, Default)]
struct CheckpointStats {
    last: Option<DateTime<Utc>>,
    count: u64,
}

struct Live<C> {
    conn: C,
    claim: ActiveClaim,
}

/// An unlocked vault.
///
/// The connection mutex also serializes checkpoints, close and caller
/// queries, so the auto-saver never reads the working copy mid-write.
pub struct VaultSession<E: StorageEngine = SqlCipherEngine> {
    name: String,
    vault_path: PathBuf,
    salt: Salt,
    staging: StagingArea,
    engine: Arc<E>,
    live: Mutex<Option<Live<E::Connection>>>,
    state: RwLock<SessionState>,
    stats: RwLock<CheckpointStats>,
}

impl<E: StorageEngine> VaultSession<E> {
    /// Unlock the vault at `vault_path`.
    ///
    /// Every failure after staging removes the working copy, so a wrong
    /// passphrase leaves nothing behind and the claim is released.
    pub(crate) fn open(
        claim: ActiveClaim,
        vault_path: PathBuf,
        passphrase: &SecretString,
        deriver: &KeyDeriver,
        engine: Arc<E>,
    ) -> VaultResult<Self> {
        let name = claim.name.clone();

        let raw = match fs::read(&vault_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(name));
            }
            Err(e) => return Err(e.into()),
        };

        let (salt, payload) = codec::split(&raw)?;
        if payload.is_empty() {
            return Err(VaultError::CorruptContainer("vault has no payload".into()));
        }

        let staging = StagingArea::for_vault(&vault_path, E::SIDECAR_SUFFIXES);
        staging.materialize(payload)?;

        let conn = match unlock_staged(engine.as_ref(), &staging, passphrase, &salt, deriver) {
            Ok(conn) => conn,
            Err(e) => {
                staging.discard();
                if matches!(e, VaultError::WrongPassphrase) {
                    tracing::info!(vault = %name, "unlock rejected: wrong passphrase");
                }
                return Err(e);
            }
        };

        claim.set(SessionState::Unlocked);
        tracing::info!(vault = %name, path = %vault_path.display(), "vault unlocked");

        Ok(Self {
            name,
            vault_path,
            salt,
            staging,
            engine,
            live: Mutex::new(Some(Live { conn, claim })),
            state: RwLock::new(SessionState::Unlocked),
            stats: RwLock::new(CheckpointStats::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == SessionState::Unlocked
    }

    pub fn info(&self) -> SessionInfo {
        let stats = self.stats.read();
        SessionInfo {
            name: self.name.clone(),
            path: self.vault_path.clone(),
            state: self.state(),
            last_checkpoint: stats.last,
            checkpoints: stats.count,
        }
    }

    /// Run `f` against the live engine handle.
    pub fn with_connection<R>(&self, f: impl FnOnce(&E::Connection) -> R) -> VaultResult<R> {
        let guard = self.live.lock();
        let live = guard.as_ref().ok_or(VaultError::Locked)?;
        Ok(f(&live.conn))
    }

    /// Like [`with_connection`](Self::with_connection), for engine calls
    /// that need exclusive access (e.g. transactions).
    pub fn with_connection_mut<R>(
        &self,
        f: impl FnOnce(&mut E::Connection) -> R,
    ) -> VaultResult<R> {
        let mut guard = self.live.lock();
        let live = guard.as_mut().ok_or(VaultError::Locked)?;
        Ok(f(&mut live.conn))
    }

    /// Fold everything committed so far into the vault file.
    pub fn checkpoint(&self) -> VaultResult<()> {
        let guard = self.live.lock();
        let live = guard.as_ref().ok_or(VaultError::Locked)?;
        self.checkpoint_conn(&live.conn)
    }

    /// Engine self-check of the unlocked database
    pub fn integrity_check(&self) -> VaultResult<bool> {
        let guard = self.live.lock();
        let live = guard.as_ref().ok_or(VaultError::Locked)?;
        Ok(self.engine.integrity_check(&live.conn)?)
    }

    /// Final checkpoint, then release the engine and the working copy.
    ///
    /// The handle is released even when the checkpoint fails; the error is
    /// returned and the working copy is kept, since it may be the only copy
    /// of recent writes. Closing twice is a no-op.
    pub fn close(&self) -> VaultResult<()> {
        let mut guard = self.live.lock();
        let Some(Live { conn, claim }) = guard.take() else {
            return Ok(());
        };

        *self.state.write() = SessionState::Locking;
        claim.set(SessionState::Locking);

        let saved = self.checkpoint_conn(&conn);
        let closed = self.engine.close(conn);

        match saved {
            Ok(()) => self.staging.discard(),
            Err(ref e) => tracing::warn!(
                vault = %self.name,
                error = %e,
                staging = %self.staging.path().display(),
                "final checkpoint failed, keeping staging artifact"
            ),
        }

        *self.state.write() = SessionState::Locked;
        drop(claim);
        tracing::info!(vault = %self.name, "vault locked");

        saved?;
        closed?;
        Ok(())
    }

    fn checkpoint_conn(&self, conn: &E::Connection) -> VaultResult<()> {
        self.engine.flush(conn)?;
        let raw = self.staging.reconcile(&self.salt, &self.vault_path)?;

        let mut stats = self.stats.write();
        stats.last = Some(Utc::now());
        stats.count += 1;
        tracing::debug!(vault = %self.name, bytes = raw.len(), count = stats.count, "checkpoint complete");
        Ok(())
    }
}

impl<E: StorageEngine> Drop for VaultSession<E> {
    fn drop(&mut self) {
        if self.live.get_mut().is_some() {
            tracing::warn!(vault = %self.name, "session dropped while unlocked, closing");
            if let Err(e) = self.close() {
                tracing::warn!(vault = %self.name, error = %e, "close on drop failed");
            }
        }
    }
}

impl<E: StorageEngine> std::fmt::Debug for VaultSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("name", &self.name)
            .field("vault_path", &self.vault_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Derive, key, probe, configure. The probe is the only wrong-passphrase check.
fn unlock_staged<E: StorageEngine>(
    engine: &E,
    staging: &StagingArea,
    passphrase: &SecretString,
    salt: &Salt,
    deriver: &KeyDeriver,
) -> VaultResult<E::Connection> {
    let key = deriver.derive(passphrase, salt)?;
    let conn = engine.open_with_key(staging.path(), &key)?;

    if let Err(e) = engine.probe(&conn) {
        tracing::debug!(error = %e, "probe query failed");
        close_quietly(engine, conn);
        return Err(VaultError::WrongPassphrase);
    }

    if let Err(e) = engine.configure(&conn) {
        close_quietly(engine, conn);
        return Err(e.into());
    }

    Ok(conn)
}

/// Close a handle on an error path; the original error is what gets reported.
pub(crate) fn close_quietly<E: StorageEngine>(engine: &E, conn: E::Connection) {
    if let Err(e) = engine.close(conn) {
        tracing::debug!(error = %e, "failed to close engine handle");
    }
}
