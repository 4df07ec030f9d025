//! Journal Vault - Store API
//!
//! Entry point for the request layer. Everything else in the application
//! (entries, goals, windows) talks to vaults through [`VaultStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use journal_vault::{StoreConfig, VaultStore};
//!
//! let store = VaultStore::new(StoreConfig::from_env()?);
//! store.create_vault("diary", "correct-horse-battery")?;
//!
//! let session = store.open_vault("diary", "correct-horse-battery")?;
//! session.with_connection(|conn| conn.execute_batch("CREATE TABLE entries (body TEXT)"))??;
//! store.checkpoint(&session)?;
//! store.close_vault(&session)?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use journal_keyvault::KeyDeriver;

use crate::config::StoreConfig;
use crate::engine::{SqlCipherEngine, StorageEngine};
use crate::error::VaultResult;
use crate::registry::JournalRegistry;
use crate::session::{ActiveVaults, SessionState, VaultSession};

/// Vault store for one vault directory
pub struct VaultStore<E: StorageEngine = SqlCipherEngine> {
    config: StoreConfig,
    registry: JournalRegistry,
    deriver: KeyDeriver,
    engine: Arc<E>,
    active: ActiveVaults,
}

impl VaultStore<SqlCipherEngine> {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_engine(config, SqlCipherEngine::new())
    }
}

impl<E: StorageEngine> VaultStore<E> {
    pub fn with_engine(config: StoreConfig, engine: E) -> Self {
        Self {
            registry: JournalRegistry::new(&config.vault_dir),
            deriver: KeyDeriver::new(config.kdf.clone()),
            engine: Arc::new(engine),
            active: ActiveVaults::new(),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &JournalRegistry {
        &self.registry
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a new vault; fails if the name is taken.
    pub fn create_vault(&self, name: &str, passphrase: &str) -> VaultResult<PathBuf> {
        let (safe, _) = self.registry.resolve(name)?;
        // Held for the whole creation so an open can't see a half-made vault
        let _claim = self.active.claim(&safe)?;

        let passphrase = SecretString::from(passphrase.to_owned());
        self.registry
            .create(name, &passphrase, &self.deriver, self.engine.as_ref())
    }

    /// Unlock a vault. One session per vault name at a time.
    pub fn open_vault(&self, name: &str, passphrase: &str) -> VaultResult<VaultSession<E>> {
        let (safe, path) = self.registry.resolve(name)?;
        let claim = self.active.claim(&safe)?;

        let passphrase = SecretString::from(passphrase.to_owned());
        VaultSession::open(
            claim,
            path,
            &passphrase,
            &self.deriver,
            Arc::clone(&self.engine),
        )
    }

    pub fn checkpoint(&self, session: &VaultSession<E>) -> VaultResult<()> {
        session.checkpoint()
    }

    pub fn close_vault(&self, session: &VaultSession<E>) -> VaultResult<()> {
        session.close()
    }

    pub fn list_vaults(&self) -> VaultResult<Vec<String>> {
        self.registry.list()
    }

    /// Lifecycle state of a vault in this store
    pub fn state(&self, name: &str) -> SessionState {
        self.active.state(&JournalRegistry::sanitize_name(name))
    }

    /// Names of vaults currently unlocked (or mid-transition)
    pub fn active_vaults(&self) -> Vec<String> {
        self.active.names()
    }

    /// Delete a vault. Refused while it is unlocked.
    pub fn remove_vault(&self, name: &str) -> VaultResult<()> {
        let (safe, _) = self.registry.resolve(name)?;
        let _claim = self.active.claim(&safe)?;
        self.registry.remove(name, E::SIDECAR_SUFFIXES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use journal_keyvault::Argon2Config;
    use rusqlite::OptionalExtension;
    use tempfile::{tempdir, TempDir};

    use crate::error::VaultError;

    const PASS: &str = "correct-horse-battery";

    fn store_in(dir: &Path) -> VaultStore {
        let mut config = StoreConfig::new(dir);
        config.kdf = Argon2Config {
            time_cost: 1,
            memory_cost_kib: 1024,
            parallelism: 1,
        };
        VaultStore::new(config)
    }

    fn setup() -> (TempDir, VaultStore) {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        (dir, store)
    }

    fn write_entry(session: &VaultSession, body: &str) {
        session
            .with_connection(|conn| {
                conn.execute_batch("CREATE TABLE IF NOT EXISTS entries (body TEXT NOT NULL)")?;
                conn.execute("INSERT INTO entries (body) VALUES (?1)", [body])
            })
            .unwrap()
            .unwrap();
    }

    fn entries(session: &VaultSession) -> Vec<String> {
        session
            .with_connection(|conn| -> rusqlite::Result<Vec<String>> {
                let exists: Option<String> = conn
                    .query_row(
                        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'entries'",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Ok(Vec::new());
                }
                let mut stmt = conn.prepare("SELECT body FROM entries ORDER BY rowid")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .unwrap()
            .unwrap()
    }

    fn staging_leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| !n.ends_with(".vault"))
            .collect()
    }

    #[test]
    fn test_create_then_open() {
        let (dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        assert_eq!(store.list_vaults().unwrap(), vec!["diary"]);
        assert_eq!(store.state("diary"), SessionState::Locked);

        let session = store.open_vault("diary", PASS).unwrap();
        assert_eq!(session.state(), SessionState::Unlocked);
        assert_eq!(store.state("diary"), SessionState::Unlocked);
        assert!(session.integrity_check().unwrap());
        assert!(dir.path().join("diary.vault.tmp").exists());

        store.close_vault(&session).unwrap();
        assert_eq!(session.state(), SessionState::Locked);
        assert_eq!(store.state("diary"), SessionState::Locked);
        assert!(staging_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_wrong_passphrase_leaves_nothing() {
        let (dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        let vault = dir.path().join("diary.vault");
        let before = fs::read(&vault).unwrap();

        let err = store.open_vault("diary", "wrong").unwrap_err();
        assert!(matches!(err, VaultError::WrongPassphrase));
        assert!(err.is_user_correctable());

        assert_eq!(store.state("diary"), SessionState::Locked);
        assert!(staging_leftovers(dir.path()).is_empty());
        assert_eq!(fs::read(&vault).unwrap(), before);

        // The right passphrase still works afterwards
        let session = store.open_vault("diary", PASS).unwrap();
        session.close().unwrap();
    }

    #[test]
    fn test_open_missing_vault() {
        let (_dir, store) = setup();
        assert!(matches!(
            store.open_vault("nobody", PASS),
            Err(VaultError::NotFound(_))
        ));
        assert_eq!(store.state("nobody"), SessionState::Locked);
    }

    #[test]
    fn test_open_corrupt_container() {
        let (dir, store) = setup();
        fs::write(dir.path().join("short.vault"), b"too short").unwrap();
        fs::write(dir.path().join("bare.vault"), [0u8; 16]).unwrap();

        assert!(matches!(
            store.open_vault("short", PASS),
            Err(VaultError::CorruptContainer(_))
        ));
        assert!(matches!(
            store.open_vault("bare", PASS),
            Err(VaultError::CorruptContainer(_))
        ));
        assert!(staging_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let (dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        let vault = dir.path().join("diary.vault");

        let mut raw = fs::read(&vault).unwrap();
        let mid = 16 + 100;
        raw[mid] ^= 0xFF;
        fs::write(&vault, &raw).unwrap();

        // Page authentication fails, which looks exactly like a wrong key
        assert!(store.open_vault("diary", PASS).is_err());
        assert!(staging_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_create_existing_name() {
        let (_dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        assert!(matches!(
            store.create_vault("diary", "other"),
            Err(VaultError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_second_open_rejected() {
        let (_dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();

        let session = store.open_vault("diary", PASS).unwrap();
        assert!(matches!(
            store.open_vault("diary", PASS),
            Err(VaultError::AlreadyUnlocked(_))
        ));
        // Creating over an unlocked vault is refused as well
        assert!(matches!(
            store.create_vault("diary", PASS),
            Err(VaultError::AlreadyUnlocked(_))
        ));

        session.close().unwrap();
        store.open_vault("diary", PASS).unwrap().close().unwrap();
    }

    #[test]
    fn test_concurrent_open() {
        let (_dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();

        let results: Vec<_> = std::thread::scope(|s| {
            let a = s.spawn(|| store.open_vault("diary", PASS));
            let b = s.spawn(|| store.open_vault("diary", PASS));
            vec![a.join().unwrap(), b.join().unwrap()]
        });

        let unlocked: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(VaultError::AlreadyUnlocked(_))))
            .count();
        assert_eq!(unlocked.len(), 1);
        assert_eq!(rejected, 1);
        assert!(unlocked[0].is_unlocked());
    }

    #[test]
    fn test_checkpoint_is_idempotent() {
        let (dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        let session = store.open_vault("diary", PASS).unwrap();
        write_entry(&session, "first");

        store.checkpoint(&session).unwrap();
        let once = fs::read(dir.path().join("diary.vault")).unwrap();
        store.checkpoint(&session).unwrap();
        let twice = fs::read(dir.path().join("diary.vault")).unwrap();
        assert_eq!(once, twice);

        let info = session.info();
        assert_eq!(info.checkpoints, 2);
        assert!(info.last_checkpoint.is_some());
        session.close().unwrap();
    }

    #[test]
    fn test_close_persists_writes() {
        let (_dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();

        let session = store.open_vault("diary", PASS).unwrap();
        write_entry(&session, "kept on close");
        store.close_vault(&session).unwrap();

        let session = store.open_vault("diary", PASS).unwrap();
        assert_eq!(entries(&session), vec!["kept on close"]);
        session.close().unwrap();
    }

    #[test]
    fn test_locked_session_refuses_work() {
        let (_dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        let session = store.open_vault("diary", PASS).unwrap();
        session.close().unwrap();

        assert!(matches!(session.checkpoint(), Err(VaultError::Locked)));
        assert!(matches!(session.with_connection(|_| ()), Err(VaultError::Locked)));
        // Second close is a no-op
        session.close().unwrap();
    }

    #[test]
    fn test_close_with_failed_checkpoint_keeps_working_copy() {
        let (dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        let vault = dir.path().join("diary.vault");

        let session = store.open_vault("diary", PASS).unwrap();
        write_entry(&session, "saved");
        store.checkpoint(&session).unwrap();
        let last_good = fs::read(&vault).unwrap();
        write_entry(&session, "unsaved");

        // A non-empty directory in place of the vault makes the rename fail
        fs::remove_file(&vault).unwrap();
        fs::create_dir(&vault).unwrap();
        fs::write(vault.join("blocker"), b"x").unwrap();

        let err = session.close().unwrap_err();
        assert!(matches!(err, VaultError::Io(_)), "{err:?}");
        assert_eq!(session.state(), SessionState::Locked);
        assert_eq!(store.state("diary"), SessionState::Locked);
        assert!(store.active_vaults().is_empty());
        assert!(dir.path().join("diary.vault.tmp").exists());
        assert!(!dir.path().join("diary.vault.partial").exists());

        fs::remove_dir_all(&vault).unwrap();
        fs::write(&vault, &last_good).unwrap();

        let session = store.open_vault("diary", PASS).unwrap();
        assert!(session.is_unlocked());
        assert_eq!(entries(&session), vec!["saved"]);
        session.close().unwrap();
    }

    #[test]
    fn test_parallel_writes_and_checkpoints() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 20;

        let (_dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        let session = store.open_vault("diary", PASS).unwrap();
        write_entry(&session, "seed");

        std::thread::scope(|s| {
            for t in 0..THREADS {
                let session = &session;
                s.spawn(move || {
                    for round in 0..ROUNDS {
                        write_entry(session, &format!("{t}-{round}"));
                        session.checkpoint().unwrap();
                    }
                });
            }
        });

        assert_eq!(session.info().checkpoints, (THREADS * ROUNDS) as u64);
        session.close().unwrap();

        let session = store.open_vault("diary", PASS).unwrap();
        let rows = entries(&session);
        assert_eq!(rows.len(), THREADS * ROUNDS + 1);
        for t in 0..THREADS {
            assert!(rows.contains(&format!("{t}-{}", ROUNDS - 1)));
        }
        session.close().unwrap();
    }

    #[test]
    fn test_drop_closes_session() {
        let (dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        {
            let session = store.open_vault("diary", PASS).unwrap();
            write_entry(&session, "saved by drop");
        }
        assert_eq!(store.state("diary"), SessionState::Locked);
        assert!(staging_leftovers(dir.path()).is_empty());

        let session = store.open_vault("diary", PASS).unwrap();
        assert_eq!(entries(&session), vec!["saved by drop"]);
    }

    #[test]
    fn test_crash_keeps_last_checkpoint() {
        let dir = tempdir().unwrap();
        {
            let store = store_in(dir.path());
            store.create_vault("diary", PASS).unwrap();
            let session = store.open_vault("diary", PASS).unwrap();

            write_entry(&session, "before checkpoint");
            store.checkpoint(&session).unwrap();
            write_entry(&session, "after checkpoint");

            // Process dies: no close, no drop
            std::mem::forget(session);
        }
        assert!(dir.path().join("diary.vault.tmp").exists());

        // Fresh process
        let store = store_in(dir.path());
        let session = store.open_vault("diary", PASS).unwrap();
        assert_eq!(entries(&session), vec!["before checkpoint"]);
        session.close().unwrap();
    }

    #[test]
    fn test_diary_scenario() {
        let dir = tempdir().unwrap();
        let vault = dir.path().join("diary.vault");
        {
            let store = store_in(dir.path());
            store.create_vault("diary", "correct-horse-battery").unwrap();
            let session = store.open_vault("diary", "correct-horse-battery").unwrap();
            write_entry(&session, "dear diary");
            store.checkpoint(&session).unwrap();
            std::mem::forget(session);
        }

        let store = store_in(dir.path());
        let session = store.open_vault("diary", "correct-horse-battery").unwrap();
        assert_eq!(entries(&session), vec!["dear diary"]);
        session.close().unwrap();

        let before = fs::read(&vault).unwrap();
        assert!(matches!(
            store.open_vault("diary", "wrong"),
            Err(VaultError::WrongPassphrase)
        ));
        assert_eq!(fs::read(&vault).unwrap(), before);
    }

    #[test]
    fn test_traversal_name_stays_in_dir() {
        let (dir, store) = setup();
        let path = store.create_vault("a/../../etc", PASS).unwrap();

        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(store.list_vaults().unwrap(), vec!["a_______etc"]);

        let session = store.open_vault("a/../../etc", PASS).unwrap();
        assert_eq!(session.name(), "a_______etc");
        session.close().unwrap();
    }

    #[test]
    fn test_salt_never_changes() {
        let (dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();
        let vault = dir.path().join("diary.vault");
        let salt = fs::read(&vault).unwrap()[..16].to_vec();

        let session = store.open_vault("diary", PASS).unwrap();
        write_entry(&session, "x");
        session.checkpoint().unwrap();
        session.close().unwrap();

        assert_eq!(fs::read(&vault).unwrap()[..16].to_vec(), salt);
    }

    #[test]
    fn test_remove_vault() {
        let (_dir, store) = setup();
        store.create_vault("diary", PASS).unwrap();

        let session = store.open_vault("diary", PASS).unwrap();
        assert!(matches!(
            store.remove_vault("diary"),
            Err(VaultError::AlreadyUnlocked(_))
        ));
        session.close().unwrap();

        store.remove_vault("diary").unwrap();
        assert!(store.list_vaults().unwrap().is_empty());
    }

    #[test]
    fn test_independent_vaults() {
        let (_dir, store) = setup();
        store.create_vault("home", "one").unwrap();
        store.create_vault("work", "two").unwrap();

        let home = store.open_vault("home", "one").unwrap();
        let work = store.open_vault("work", "two").unwrap();
        assert_eq!(store.active_vaults(), vec!["home", "work"]);

        write_entry(&home, "home entry");
        home.close().unwrap();
        assert_eq!(entries(&work), Vec::<String>::new());
        work.close().unwrap();
    }
}
