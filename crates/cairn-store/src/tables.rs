//! Table definitions for the redb engine.
//!
//! All three keyspaces live in one database file so a single write
//! transaction covers a data mutation and its journal record.

use redb::TableDefinition;

/// Table definitions for the block repository.
pub struct Tables;

impl Tables {
    /// Block content: key text → raw bytes
    pub const BLOCKS: TableDefinition<'static, &'static str, &'static [u8]> =
        TableDefinition::new("blocks");

    /// Pinned keys: key text → sequence of the journal record that pinned it
    pub const PINS: TableDefinition<'static, &'static str, u64> = TableDefinition::new("pins");

    /// Mutation journal: sequence → CRC-framed JournalRecord
    pub const JOURNAL: TableDefinition<'static, u64, &'static [u8]> =
        TableDefinition::new("journal");
}
