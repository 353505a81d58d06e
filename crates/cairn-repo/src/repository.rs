use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use cairn_store::{
    verify_journal, Datastore, InMemoryDatastore, JournalCursor, JournalReport, PinAudit,
    RedbDatastore, StoreError,
};
use cairn_types::{Block, Key};
use tracing::{error, info, warn};

use crate::config::{Backend, RepoConfig};
use crate::error::{RepoError, RepoResult};
use crate::lock::RepoLock;

/// Name of the configuration file inside the repository root.
pub const CONFIG_FILE: &str = "config";

/// Name of the redb engine file inside the datastore directory.
pub const ENGINE_FILE: &str = "blocks.redb";

/// Lifecycle state of a [`Repository`] handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepoState {
    /// No repository exists at the path yet.
    Unbuilt,
    /// The on-disk structure exists; no engine handles are held.
    Built,
    /// The lock and the datastore are held.
    Open,
    /// The handle was opened and then closed. Terminal for this handle.
    Closed,
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbuilt => write!(f, "unbuilt"),
            Self::Built => write!(f, "built"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Result of [`Repository::build`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    Created,
    /// A valid repository was already present; nothing was written.
    AlreadyBuilt,
}

/// Resources held while a repository is open.
///
/// Field order matters: the datastore is dropped before the lock is released.
struct Session {
    datastore: Box<dyn Datastore>,
    config: RepoConfig,
    _lock: RepoLock,
}

/// Owner of one repository root on disk.
///
/// ```text
/// <root>/
///   config             TOML RepoConfig
///   repo.lock          exclusive process lock while open
///   datastore/
///     blocks.redb      blocks, pins and journal tables
/// ```
///
/// Datastore operations are only valid while the handle is
/// [`RepoState::Open`]; anywhere else they fail with
/// [`RepoError::InvalidState`]. Dropping an open handle closes it.
pub struct Repository {
    root: PathBuf,
    state: RepoState,
    session: Option<Session>,
}

impl Repository {
    /// Create the on-disk structure at `root` unless a repository is already
    /// there. Never opens engine handles.
    pub fn build(root: &Path, config: &RepoConfig) -> RepoResult<BuildOutcome> {
        let config_path = root.join(CONFIG_FILE);
        if config_path.is_file() {
            RepoConfig::load(&config_path)?;
            info!(path = %root.display(), "repository already built");
            return Ok(BuildOutcome::AlreadyBuilt);
        }

        config.validate().map_err(RepoError::InvalidConfig)?;
        fs::create_dir_all(root.join(&config.datastore.path))?;
        config.save(&config_path)?;

        info!(
            path = %root.display(),
            backend = ?config.datastore.backend,
            "built repository"
        );
        Ok(BuildOutcome::Created)
    }

    /// A closed handle on the repository at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state = if root.join(CONFIG_FILE).is_file() {
            RepoState::Built
        } else {
            RepoState::Unbuilt
        };
        Self {
            root,
            state,
            session: None,
        }
    }

    /// Build (if needed) and open the repository at `root` in one step.
    pub fn open_at(root: &Path, config: &RepoConfig) -> RepoResult<Self> {
        Self::build(root, config)?;
        let mut repo = Self::at(root);
        repo.open()?;
        Ok(repo)
    }

    /// Take the process lock, load the config and open the datastore.
    ///
    /// On any failure every acquired resource is released and the handle
    /// stays `Built`.
    pub fn open(&mut self) -> RepoResult<()> {
        self.expect_state("open", RepoState::Built)?;

        let lock = RepoLock::acquire(&self.root)?;
        let config = RepoConfig::load(&self.root.join(CONFIG_FILE))?;
        let datastore = self.open_datastore(&config).inspect_err(|e| {
            error!(path = %self.root.display(), error = %e, "failed to open datastore");
        })?;

        self.session = Some(Session {
            datastore,
            config,
            _lock: lock,
        });
        self.state = RepoState::Open;
        info!(path = %self.root.display(), "repository open");
        Ok(())
    }

    fn open_datastore(&self, config: &RepoConfig) -> RepoResult<Box<dyn Datastore>> {
        match config.datastore.backend {
            Backend::Memory => {
                warn!(path = %self.root.display(), "using non-durable in-memory datastore");
                Ok(Box::new(InMemoryDatastore::new()))
            }
            Backend::Redb => {
                let path = self.root.join(&config.datastore.path).join(ENGINE_FILE);
                let store = RedbDatastore::open(&path, config.datastore.engine_options())
                    .map_err(|e| match e {
                        StoreError::AlreadyOpen => RepoError::Lock(self.root.clone()),
                        e => e.into(),
                    })?;
                if let Some(tail) = store.check_journal_tail()? {
                    info!(sequence = tail.sequence, "journal tail verified");
                }
                Ok(Box::new(store))
            }
        }
    }

    /// Release the datastore and the lock. Closing a handle that is not open
    /// is a no-op.
    ///
    /// Pending commits are flushed first; if that fails the resources are
    /// still released and the error is returned.
    pub fn close(&mut self) -> RepoResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.state = RepoState::Closed;

        let flushed = session.datastore.flush();
        drop(session);
        info!(path = %self.root.display(), "repository closed");
        flushed.map_err(RepoError::from)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> RepoState {
        self.state
    }

    /// Configuration the repository was opened with.
    pub fn config(&self) -> RepoResult<&RepoConfig> {
        Ok(&self.session("config")?.config)
    }

    /// The opened datastore.
    ///
    /// The returned borrow keeps `close` from being called while it is alive.
    pub fn datastore(&self) -> RepoResult<&dyn Datastore> {
        self.store("datastore")
    }

    fn session(&self, operation: &'static str) -> RepoResult<&Session> {
        self.expect_state(operation, RepoState::Open)?;
        self.session.as_ref().ok_or(RepoError::InvalidState {
            operation,
            required: RepoState::Open,
            actual: self.state,
        })
    }

    fn expect_state(&self, operation: &'static str, required: RepoState) -> RepoResult<()> {
        if self.state != required {
            return Err(RepoError::InvalidState {
                operation,
                required,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn store(&self, operation: &'static str) -> RepoResult<&dyn Datastore> {
        Ok(self.session(operation)?.datastore.as_ref())
    }

    // -----------------------------------------------------------------------
    // Datastore shortcuts
    // -----------------------------------------------------------------------

    pub fn put(&self, key: &Key, value: &[u8]) -> RepoResult<()> {
        Ok(self.store("put")?.put(key, value)?)
    }

    pub fn get(&self, key: &Key) -> RepoResult<Option<Vec<u8>>> {
        Ok(self.store("get")?.get(key)?)
    }

    pub fn delete(&self, key: &Key) -> RepoResult<()> {
        Ok(self.store("delete")?.delete(key)?)
    }

    pub fn has(&self, key: &Key) -> RepoResult<bool> {
        Ok(self.store("has")?.has(key)?)
    }

    /// Store a block under its derived key.
    pub fn put_block(&self, block: &Block) -> RepoResult<Key> {
        Ok(self.store("put_block")?.put_block(block)?)
    }

    /// Read a block, checking its content against the key.
    pub fn get_block(&self, key: &Key) -> RepoResult<Option<Block>> {
        Ok(self.store("get_block")?.get_block(key)?)
    }

    /// Set the pin state of a stored block. `false` if the key is absent.
    pub fn set_pin(&self, key: &Key, pin: bool) -> RepoResult<bool> {
        Ok(self.store("set_pin")?.set_pin(key, pin)?)
    }

    pub fn is_pinned(&self, key: &Key) -> RepoResult<bool> {
        Ok(self.store("is_pinned")?.is_pinned(key)?)
    }

    pub fn journal_cursor(&self) -> RepoResult<JournalCursor> {
        Ok(self.store("journal_cursor")?.journal_cursor()?)
    }

    pub fn journal_len(&self) -> RepoResult<u64> {
        Ok(self.store("journal_len")?.journal_len()?)
    }

    /// Scan the entire journal and check its structure.
    pub fn verify(&self) -> RepoResult<JournalReport> {
        let mut cursor = self.store("verify")?.journal_cursor()?;
        let report = verify_journal(&mut cursor)?;
        info!(
            records = report.records,
            puts = report.puts,
            deletes = report.deletes,
            pins = report.pins,
            "journal verification passed"
        );
        Ok(report)
    }

    /// Replay the journal into per-key pin state.
    pub fn pin_audit(&self) -> RepoResult<PinAudit> {
        let mut cursor = self.store("pin_audit")?.journal_cursor()?;
        Ok(PinAudit::from_cursor(&mut cursor)?)
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(path = %self.root.display(), error = %e, "error closing repository on drop");
        }
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_crypto::KeyDeriver;
    use cairn_store::tables::Tables;
    use cairn_store::{CursorOp, Operation};
    use proptest::prelude::*;

    fn key(content: &[u8]) -> Key {
        KeyDeriver::BLOCK.derive(content)
    }

    fn open_repo(root: &Path) -> Repository {
        Repository::open_at(root, &RepoConfig::default()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    #[test]
    fn build_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        let outcome = Repository::build(&root, &RepoConfig::default()).unwrap();
        assert_eq!(outcome, BuildOutcome::Created);
        assert!(root.join(CONFIG_FILE).is_file());
        assert!(root.join("datastore").is_dir());
        assert!(!root.join("datastore").join(ENGINE_FILE).exists());
    }

    #[test]
    fn build_twice_reports_already_built() {
        let dir = tempfile::tempdir().unwrap();
        Repository::build(dir.path(), &RepoConfig::default()).unwrap();
        let outcome = Repository::build(dir.path(), &RepoConfig::in_memory()).unwrap();
        assert_eq!(outcome, BuildOutcome::AlreadyBuilt);
        let loaded = RepoConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(loaded.datastore.backend, Backend::Redb);
    }

    #[test]
    fn build_over_corrupt_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "version = \"one\"").unwrap();
        let err = Repository::build(dir.path(), &RepoConfig::default()).unwrap_err();
        assert!(matches!(err, RepoError::CorruptConfig { .. }));
    }

    #[test]
    fn build_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepoConfig::default();
        config.datastore.path = PathBuf::from("../escape");
        let err = Repository::build(dir.path(), &config).unwrap_err();
        assert!(matches!(err, RepoError::InvalidConfig(_)));
        assert!(!dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn at_detects_state() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Repository::at(dir.path()).state(), RepoState::Unbuilt);
        Repository::build(dir.path(), &RepoConfig::default()).unwrap();
        assert_eq!(Repository::at(dir.path()).state(), RepoState::Built);
    }

    // -----------------------------------------------------------------------
    // Open / close
    // -----------------------------------------------------------------------

    #[test]
    fn hello_world_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(dir.path());
        let content = b"Hello, world!";
        let k = key(content);

        repo.put(&k, content).unwrap();
        assert_eq!(repo.get(&k).unwrap().as_deref(), Some(&content[..]));

        let mut cursor = repo.journal_cursor().unwrap();
        let first = cursor.get(CursorOp::First).unwrap().unwrap();
        assert_eq!(first.key, k);
        assert!(!first.pin);
        assert_eq!(first.operation, Operation::Put);
        assert!(cursor.get(CursorOp::Next).unwrap().is_none());
    }

    #[test]
    fn open_unbuilt_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::at(dir.path());
        let err = repo.open().unwrap_err();
        assert!(matches!(
            err,
            RepoError::InvalidState {
                actual: RepoState::Unbuilt,
                ..
            }
        ));
    }

    #[test]
    fn operations_outside_open_are_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        Repository::build(dir.path(), &RepoConfig::default()).unwrap();
        let mut repo = Repository::at(dir.path());
        let k = key(b"x");

        assert!(matches!(repo.put(&k, b"x"), Err(RepoError::InvalidState { .. })));
        assert!(matches!(repo.datastore(), Err(RepoError::InvalidState { .. })));

        repo.open().unwrap();
        repo.put(&k, b"x").unwrap();
        repo.close().unwrap();

        assert!(matches!(
            repo.get(&k),
            Err(RepoError::InvalidState {
                actual: RepoState::Closed,
                ..
            })
        ));
        assert!(matches!(repo.journal_cursor(), Err(RepoError::InvalidState { .. })));
        assert!(matches!(repo.open(), Err(RepoError::InvalidState { .. })));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = open_repo(dir.path());
        repo.close().unwrap();
        repo.close().unwrap();
        assert_eq!(repo.state(), RepoState::Closed);

        let mut never_opened = Repository::at(dir.path());
        never_opened.close().unwrap();
        assert_eq!(never_opened.state(), RepoState::Built);
    }

    #[test]
    fn second_handle_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = open_repo(dir.path());

        let mut second = Repository::at(dir.path());
        let err = second.open().unwrap_err();
        assert!(matches!(err, RepoError::Lock(_)));
        assert_eq!(second.state(), RepoState::Built);

        first.close().unwrap();
        second.open().unwrap();
        assert_eq!(second.state(), RepoState::Open);
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        drop(open_repo(dir.path()));
        let mut again = Repository::at(dir.path());
        again.open().unwrap();
    }

    #[test]
    fn reopen_preserves_data_and_journal() {
        let dir = tempfile::tempdir().unwrap();
        let a = key(b"alpha");
        let b = key(b"beta");
        {
            let mut repo = open_repo(dir.path());
            repo.put(&a, b"alpha").unwrap();
            repo.put(&b, b"beta").unwrap();
            repo.set_pin(&a, true).unwrap();
            repo.delete(&b).unwrap();
            repo.close().unwrap();
        }

        let mut repo = Repository::at(dir.path());
        repo.open().unwrap();
        assert_eq!(repo.get(&a).unwrap().as_deref(), Some(&b"alpha"[..]));
        assert!(repo.is_pinned(&a).unwrap());
        assert!(!repo.has(&b).unwrap());
        assert_eq!(repo.journal_len().unwrap(), 4);

        repo.put(&b, b"beta").unwrap();
        let last = repo
            .journal_cursor()
            .unwrap()
            .get(CursorOp::Last)
            .unwrap()
            .unwrap();
        assert_eq!(last.sequence, 5);
    }

    #[test]
    fn eventual_sync_survives_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepoConfig::default();
        config.datastore.sync = cairn_store::SyncPolicy::Eventual;
        let k = key(b"lazy");
        {
            let mut repo = Repository::open_at(dir.path(), &config).unwrap();
            repo.put(&k, b"lazy").unwrap();
            repo.close().unwrap();
        }
        let repo = Repository::open_at(dir.path(), &config).unwrap();
        assert!(repo.has(&k).unwrap());
    }

    #[test]
    fn memory_backend_is_not_durable() {
        let dir = tempfile::tempdir().unwrap();
        let k = key(b"ephemeral");
        {
            let repo = Repository::open_at(dir.path(), &RepoConfig::in_memory()).unwrap();
            repo.put(&k, b"ephemeral").unwrap();
            assert_eq!(repo.journal_len().unwrap(), 1);
            assert_eq!(repo.config().unwrap().datastore.backend, Backend::Memory);
        }
        let repo = Repository::open_at(dir.path(), &RepoConfig::in_memory()).unwrap();
        assert!(!repo.has(&k).unwrap());
        assert!(!dir.path().join("datastore").join(ENGINE_FILE).exists());
    }

    // -----------------------------------------------------------------------
    // Corruption
    // -----------------------------------------------------------------------

    #[test]
    fn corrupt_config_blocks_open() {
        let dir = tempfile::tempdir().unwrap();
        Repository::build(dir.path(), &RepoConfig::default()).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[datastore\nbackend=").unwrap();

        let mut repo = Repository::at(dir.path());
        let err = repo.open().unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(repo.state(), RepoState::Built);
    }

    #[test]
    fn corrupt_engine_blocks_open_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        Repository::build(dir.path(), &RepoConfig::default()).unwrap();
        let engine = dir.path().join("datastore").join(ENGINE_FILE);
        fs::write(&engine, vec![0x5a; 8192]).unwrap();

        let mut repo = Repository::at(dir.path());
        assert!(repo.open().is_err());
        assert_eq!(repo.state(), RepoState::Built);
        assert!(RepoLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn corrupt_journal_tail_blocks_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut repo = open_repo(dir.path());
            repo.put(&key(b"one"), b"one").unwrap();
            repo.put(&key(b"two"), b"two").unwrap();
            repo.close().unwrap();
        }

        let engine = dir.path().join("datastore").join(ENGINE_FILE);
        {
            let db = redb::Database::open(&engine).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut journal = txn.open_table(Tables::JOURNAL).unwrap();
                journal.insert(2u64, &b"\x00\x00\x00\x00garbage"[..]).unwrap();
            }
            txn.commit().unwrap();
        }

        let mut repo = Repository::at(dir.path());
        let err = repo.open().unwrap_err();
        assert!(matches!(
            err,
            RepoError::CorruptRecord(StoreError::CorruptRecord { sequence: 2, .. })
        ));
        assert_eq!(repo.state(), RepoState::Built);
    }

    // -----------------------------------------------------------------------
    // Journal replay
    // -----------------------------------------------------------------------

    #[test]
    fn journal_enumerates_every_mutation_once() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(dir.path());
        let keys: Vec<Key> = (0..10u8).map(|i| key(&[i])).collect();
        let mut mutations = 0;
        for (i, k) in keys.iter().enumerate() {
            repo.put(k, &[i as u8]).unwrap();
            mutations += 1;
            if i % 2 == 0 {
                repo.set_pin(k, true).unwrap();
                mutations += 1;
            }
            if i % 5 == 0 {
                repo.delete(k).unwrap();
                mutations += 1;
            }
        }

        let report = repo.verify().unwrap();
        assert_eq!(report.records, mutations);
        assert_eq!(report.first_sequence, Some(1));
        assert_eq!(report.last_sequence, Some(mutations));
        assert_eq!(report.puts, 10);
        assert_eq!(report.pins, 5);
        assert_eq!(report.deletes, 2);

        let seqs: Vec<u64> = repo
            .journal_cursor()
            .unwrap()
            .map(|r| r.unwrap().sequence)
            .collect();
        assert_eq!(seqs, (1..=mutations).collect::<Vec<_>>());
    }

    #[test]
    fn pin_audit_reflects_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(dir.path());
        let keep = repo.put_block(&Block::from_slice(b"keep")).unwrap();
        let loose = repo.put_block(&Block::from_slice(b"loose")).unwrap();
        repo.set_pin(&keep, true).unwrap();

        let audit = repo.pin_audit().unwrap();
        assert_eq!(audit.pinned().collect::<Vec<_>>(), vec![&keep]);
        assert_eq!(audit.unpinned().collect::<Vec<_>>(), vec![&loose]);
        assert_eq!(
            repo.get_block(&keep).unwrap(),
            Some(Block::from_slice(b"keep"))
        );
    }

    #[test]
    fn idempotent_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(dir.path());
        let k = key(b"never stored");
        repo.delete(&k).unwrap();
        assert!(repo.get(&k).unwrap().is_none());
        assert_eq!(repo.journal_len().unwrap(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn put_get_roundtrip(content in proptest::collection::vec(any::<u8>(), 1..512)) {
            let dir = tempfile::tempdir().unwrap();
            let repo = Repository::open_at(dir.path(), &RepoConfig::in_memory()).unwrap();
            let k = key(&content);
            repo.put(&k, &content).unwrap();
            prop_assert_eq!(repo.get(&k).unwrap(), Some(content));
        }
    }
}
