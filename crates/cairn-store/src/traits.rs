use cairn_crypto::KeyDeriver;
use cairn_types::{Block, Key};

use crate::cursor::JournalCursor;
use crate::error::{StoreError, StoreResult};

/// Transactional key/value store with a built-in mutation journal.
///
/// All implementations must satisfy these invariants:
/// - Every mutating call that changes state appends exactly one journal
///   record, committed atomically with the data change.
/// - Absence is `Ok(None)` / `Ok(false)`, never an error.
/// - `delete` is idempotent. Deleting an absent key changes nothing and
///   therefore journals nothing.
/// - A failed call leaves the store as it was; callers may retry.
/// - All I/O errors are propagated, never silently ignored.
pub trait Datastore: Send + Sync {
    /// Write `value` under `key` and journal a `Put`.
    ///
    /// The journal record carries the key's current pin state.
    fn put(&self, key: &Key, value: &[u8]) -> StoreResult<()>;

    /// Read the value stored under `key`.
    fn get(&self, key: &Key) -> StoreResult<Option<Vec<u8>>>;

    /// Remove `key` and its pin, journaling a `Delete` if it was present.
    fn delete(&self, key: &Key) -> StoreResult<()>;

    /// Check whether `key` is present.
    fn has(&self, key: &Key) -> StoreResult<bool>;

    /// Set the pin state of a present key and journal a `Pin` record.
    ///
    /// Returns `false` without journaling if the key is absent.
    fn set_pin(&self, key: &Key, pin: bool) -> StoreResult<bool>;

    /// Current pin state of `key`. Absent keys are unpinned.
    fn is_pinned(&self, key: &Key) -> StoreResult<bool>;

    /// Open a cursor over a snapshot of the journal.
    fn journal_cursor(&self) -> StoreResult<JournalCursor>;

    /// Number of records in the journal.
    fn journal_len(&self) -> StoreResult<u64>;

    /// Make every committed mutation durable. A no-op for backends whose
    /// commits are always durable or never are.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Store a block under its content-derived key and return the key.
    fn put_block(&self, block: &Block) -> StoreResult<Key> {
        let key = KeyDeriver::BLOCK.derive_block(block);
        self.put(&key, block.data())?;
        Ok(key)
    }

    /// Read a block and check that its content still hashes to `key`.
    fn get_block(&self, key: &Key) -> StoreResult<Option<Block>> {
        let Some(data) = self.get(key)? else {
            return Ok(None);
        };
        if !KeyDeriver::BLOCK.verify(&data, key) {
            return Err(StoreError::CorruptBlock {
                key: key.clone(),
                reason: format!("content hashes to {}", KeyDeriver::BLOCK.derive(&data)),
            });
        }
        Ok(Some(Block::new(data)))
    }
}
