use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cairn_types::Key;
use tracing::debug;

use crate::cursor::{JournalCursor, JournalSnapshot};
use crate::error::{StoreError, StoreResult};
use crate::journal::{JournalRecord, Operation};
use crate::traits::Datastore;

type Journal = BTreeMap<u64, JournalRecord>;

#[derive(Default)]
struct MemoryState {
    blocks: HashMap<Key, Vec<u8>>,
    pins: HashMap<Key, u64>,
    /// Shared with open cursors; copied on the next write while any cursor
    /// still holds it.
    journal: Arc<Journal>,
}

impl MemoryState {
    fn append(&mut self, key: &Key, pin: bool, operation: Operation) -> u64 {
        let journal = Arc::make_mut(&mut self.journal);
        let previous = journal.values().next_back();
        let record = JournalRecord::next_after(previous, key.clone(), pin, operation);
        let sequence = record.sequence;
        journal.insert(sequence, record);
        sequence
    }
}

/// In-memory, HashMap-based datastore.
///
/// Intended for tests and embedding. Nothing is durable. Data, pins and the
/// journal sit behind one `RwLock`, so each mutation and its journal record
/// become visible together.
pub struct InMemoryDatastore {
    state: RwLock<MemoryState>,
}

impl InMemoryDatastore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.blocks.len())
    }

    /// Returns `true` if no blocks are stored.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read()?.blocks.is_empty())
    }

    /// Total bytes across all stored values.
    pub fn total_bytes(&self) -> StoreResult<u64> {
        Ok(self
            .read()?
            .blocks
            .values()
            .map(|v| v.len() as u64)
            .sum())
    }

    /// Sorted list of all stored keys.
    pub fn all_keys(&self) -> StoreResult<Vec<Key>> {
        let state = self.read()?;
        let mut keys: Vec<Key> = state.blocks.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for InMemoryDatastore {
    fn put(&self, key: &Key, value: &[u8]) -> StoreResult<()> {
        let mut state = self.write()?;
        state.blocks.insert(key.clone(), value.to_vec());
        let pinned = state.pins.contains_key(key);
        let sequence = state.append(key, pinned, Operation::Put);
        debug!(key = %key.short(), sequence, len = value.len(), "memory put");
        Ok(())
    }

    fn get(&self, key: &Key) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.read()?.blocks.get(key).cloned())
    }

    fn delete(&self, key: &Key) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.blocks.remove(key).is_none() {
            return Ok(());
        }
        state.pins.remove(key);
        let sequence = state.append(key, false, Operation::Delete);
        debug!(key = %key.short(), sequence, "memory delete");
        Ok(())
    }

    fn has(&self, key: &Key) -> StoreResult<bool> {
        Ok(self.read()?.blocks.contains_key(key))
    }

    fn set_pin(&self, key: &Key, pin: bool) -> StoreResult<bool> {
        let mut state = self.write()?;
        if !state.blocks.contains_key(key) {
            return Ok(false);
        }
        let sequence = state.append(key, pin, Operation::Pin);
        if pin {
            state.pins.insert(key.clone(), sequence);
        } else {
            state.pins.remove(key);
        }
        debug!(key = %key.short(), sequence, pin, "memory pin");
        Ok(true)
    }

    fn is_pinned(&self, key: &Key) -> StoreResult<bool> {
        Ok(self.read()?.pins.contains_key(key))
    }

    fn journal_cursor(&self) -> StoreResult<JournalCursor> {
        let journal = Arc::clone(&self.read()?.journal);
        Ok(JournalCursor::new(Box::new(MemorySnapshot { journal })))
    }

    fn journal_len(&self) -> StoreResult<u64> {
        Ok(self.read()?.journal.len() as u64)
    }
}

impl std::fmt::Debug for InMemoryDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("InMemoryDatastore");
        if let Ok(state) = self.state.read() {
            s.field("block_count", &state.blocks.len())
                .field("journal_len", &state.journal.len());
        }
        s.finish()
    }
}

struct MemorySnapshot {
    journal: Arc<Journal>,
}

impl JournalSnapshot for MemorySnapshot {
    fn first(&self) -> StoreResult<Option<JournalRecord>> {
        Ok(self.journal.values().next().cloned())
    }

    fn last(&self) -> StoreResult<Option<JournalRecord>> {
        Ok(self.journal.values().next_back().cloned())
    }

    fn after(&self, sequence: u64) -> StoreResult<Option<JournalRecord>> {
        Ok(self
            .journal
            .range((Bound::Excluded(sequence), Bound::Unbounded))
            .next()
            .map(|(_, r)| r.clone()))
    }

    fn before(&self, sequence: u64) -> StoreResult<Option<JournalRecord>> {
        Ok(self
            .journal
            .range(..sequence)
            .next_back()
            .map(|(_, r)| r.clone()))
    }
}
