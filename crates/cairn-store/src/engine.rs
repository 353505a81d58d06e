use std::fs;
use std::path::{Path, PathBuf};

use cairn_types::Key;
use redb::{
    AccessGuard, Database, Durability, ReadOnlyTable, ReadableTable, ReadableTableMetadata,
    StorageError, Table, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cursor::{JournalCursor, JournalSnapshot};
use crate::error::{StoreError, StoreResult};
use crate::journal::{JournalRecord, Operation};
use crate::tables::Tables;
use crate::traits::Datastore;

/// Commit durability for write transactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPolicy {
    /// Each commit is persisted before it returns (safest).
    #[default]
    Immediate,
    /// Commits are persisted by a later immediate commit or on clean close.
    Eventual,
}

impl From<SyncPolicy> for Durability {
    fn from(policy: SyncPolicy) -> Self {
        match policy {
            SyncPolicy::Immediate => Durability::Immediate,
            SyncPolicy::Eventual => Durability::Eventual,
        }
    }
}

/// Options for opening the engine file.
#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
    /// Commit durability.
    pub sync: SyncPolicy,
    /// Page cache size in bytes; the engine default when `None`.
    pub cache_size: Option<usize>,
}

impl From<redb::Error> for StoreError {
    fn from(e: redb::Error) -> Self {
        match e {
            redb::Error::Corrupted(reason) => Self::CorruptEngine(reason),
            redb::Error::Io(e) => Self::Io(e),
            redb::Error::DatabaseAlreadyOpen => Self::AlreadyOpen,
            other => Self::Engine(other.to_string()),
        }
    }
}

macro_rules! from_redb_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    redb::Error::from(e).into()
                }
            }
        )*
    };
}

from_redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    redb::CompactionError,
);

/// Durable datastore backed by an embedded redb database.
///
/// Blocks, pins and the journal are three tables of one database file. Every
/// mutation runs in a single write transaction that also appends the journal
/// record, so a crash can never commit one without the other. redb allows one
/// writer at a time and any number of snapshot readers; journal cursors hold
/// a read transaction for their whole lifetime.
pub struct RedbDatastore {
    db: Database,
    path: PathBuf,
    sync: SyncPolicy,
}

impl RedbDatastore {
    /// Open (or create) the engine file at `path`.
    pub fn open(path: &Path, options: EngineOptions) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut builder = redb::Builder::new();
        if let Some(bytes) = options.cache_size {
            builder.set_cache_size(bytes);
        }
        let db = builder.create(path)?;

        let store = Self {
            db,
            path: path.to_path_buf(),
            sync: options.sync,
        };
        store.init_tables()?;

        info!(path = %path.display(), sync = ?options.sync, "opened redb datastore");
        Ok(store)
    }

    /// Path of the engine file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the newest journal record.
    ///
    /// Run at open time so a corrupt tail stops the repository before any
    /// write tries to extend it.
    pub fn check_journal_tail(&self) -> StoreResult<Option<JournalRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::JOURNAL)?;
        let tail = match table.last()? {
            Some((seq, bytes)) => Some(JournalRecord::decode(seq.value(), bytes.value())?),
            None => None,
        };
        Ok(tail)
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::BLOCKS)?;
        Ok(table.len()?)
    }

    /// Reclaim free pages in the engine file. Returns `true` if any work was
    /// done.
    pub fn compact(&mut self) -> StoreResult<bool> {
        let compacted = self.db.compact()?;
        debug!(path = %self.path.display(), compacted, "redb compaction");
        Ok(compacted)
    }

    fn init_tables(&self) -> StoreResult<()> {
        let txn = self.begin_write()?;
        {
            txn.open_table(Tables::BLOCKS)?;
            txn.open_table(Tables::PINS)?;
            txn.open_table(Tables::JOURNAL)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn begin_write(&self) -> StoreResult<WriteTransaction> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(self.sync.into());
        Ok(txn)
    }
}

/// Append the record following the current journal tail.
fn append(
    journal: &mut Table<'_, u64, &'static [u8]>,
    key: &Key,
    pin: bool,
    operation: Operation,
) -> StoreResult<JournalRecord> {
    let previous = match journal.last()? {
        Some((seq, bytes)) => Some(JournalRecord::decode(seq.value(), bytes.value())?),
        None => None,
    };
    let record = JournalRecord::next_after(previous.as_ref(), key.clone(), pin, operation);
    let encoded = record.encode()?;
    journal.insert(record.sequence, encoded.as_slice())?;
    Ok(record)
}

impl Datastore for RedbDatastore {
    fn put(&self, key: &Key, value: &[u8]) -> StoreResult<()> {
        let txn = self.begin_write()?;
        let record = {
            let mut blocks = txn.open_table(Tables::BLOCKS)?;
            let pins = txn.open_table(Tables::PINS)?;
            let mut journal = txn.open_table(Tables::JOURNAL)?;

            blocks.insert(key.as_str(), value)?;
            let pinned = pins.get(key.as_str())?.is_some();
            append(&mut journal, key, pinned, Operation::Put)?
        };
        txn.commit()?;

        debug!(key = %key.short(), sequence = record.sequence, len = value.len(), "put");
        Ok(())
    }

    fn get(&self, key: &Key) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::BLOCKS)?;
        let value = table.get(key.as_str())?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn delete(&self, key: &Key) -> StoreResult<()> {
        let txn = self.begin_write()?;
        let record = {
            let mut blocks = txn.open_table(Tables::BLOCKS)?;
            let existed = blocks.remove(key.as_str())?.is_some();
            if existed {
                let mut pins = txn.open_table(Tables::PINS)?;
                let mut journal = txn.open_table(Tables::JOURNAL)?;
                pins.remove(key.as_str())?;
                Some(append(&mut journal, key, false, Operation::Delete)?)
            } else {
                None
            }
        };

        match record {
            Some(record) => {
                txn.commit()?;
                debug!(key = %key.short(), sequence = record.sequence, "delete");
            }
            None => {
                txn.abort()?;
                debug!(key = %key.short(), "delete of absent key");
            }
        }
        Ok(())
    }

    fn has(&self, key: &Key) -> StoreResult<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::BLOCKS)?;
        let present = table.get(key.as_str())?.is_some();
        Ok(present)
    }

    fn set_pin(&self, key: &Key, pin: bool) -> StoreResult<bool> {
        let txn = self.begin_write()?;
        let record = {
            let blocks = txn.open_table(Tables::BLOCKS)?;
            if blocks.get(key.as_str())?.is_none() {
                None
            } else {
                let mut pins = txn.open_table(Tables::PINS)?;
                let mut journal = txn.open_table(Tables::JOURNAL)?;
                let record = append(&mut journal, key, pin, Operation::Pin)?;
                if pin {
                    pins.insert(key.as_str(), record.sequence)?;
                } else {
                    pins.remove(key.as_str())?;
                }
                Some(record)
            }
        };

        match record {
            Some(record) => {
                txn.commit()?;
                debug!(key = %key.short(), sequence = record.sequence, pin, "pin");
                Ok(true)
            }
            None => {
                txn.abort()?;
                Ok(false)
            }
        }
    }

    fn is_pinned(&self, key: &Key) -> StoreResult<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::PINS)?;
        let pinned = table.get(key.as_str())?.is_some();
        Ok(pinned)
    }

    fn journal_cursor(&self) -> StoreResult<JournalCursor> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::JOURNAL)?;
        Ok(JournalCursor::new(Box::new(RedbSnapshot { table })))
    }

    fn journal_len(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::JOURNAL)?;
        Ok(table.len()?)
    }

    /// Commit an empty transaction with immediate durability, which persists
    /// any earlier `Eventual` commits.
    fn flush(&self) -> StoreResult<()> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::Immediate);
        txn.commit()?;
        debug!(path = %self.path.display(), "flushed");
        Ok(())
    }
}

impl std::fmt::Debug for RedbDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDatastore")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .finish()
    }
}

/// Journal view pinned to the read transaction the table was opened in.
struct RedbSnapshot {
    table: ReadOnlyTable<u64, &'static [u8]>,
}

type JournalEntry<'a> = (AccessGuard<'a, u64>, AccessGuard<'a, &'static [u8]>);

fn decode_entry(entry: Option<Result<JournalEntry<'_>, StorageError>>) -> StoreResult<Option<JournalRecord>> {
    match entry {
        Some(item) => {
            let (seq, bytes) = item?;
            JournalRecord::decode(seq.value(), bytes.value()).map(Some)
        }
        None => Ok(None),
    }
}

impl JournalSnapshot for RedbSnapshot {
    fn first(&self) -> StoreResult<Option<JournalRecord>> {
        decode_entry(self.table.first().transpose())
    }

    fn last(&self) -> StoreResult<Option<JournalRecord>> {
        decode_entry(self.table.last().transpose())
    }

    fn after(&self, sequence: u64) -> StoreResult<Option<JournalRecord>> {
        let Some(start) = sequence.checked_add(1) else {
            return Ok(None);
        };
        let mut range = self.table.range(start..)?;
        decode_entry(range.next())
    }

    fn before(&self, sequence: u64) -> StoreResult<Option<JournalRecord>> {
        let mut range = self.table.range(..sequence)?;
        decode_entry(range.next_back())
    }
}
