//! Content-addressed datastore and mutation journal for Cairn.
//!
//! Blocks are stored under the key derived from their content, and every
//! mutation of the store appends exactly one [`JournalRecord`] in the same
//! transaction as the data change. The journal is the durable history used
//! for garbage-collection marking and pin audits.
//!
//! # Backends
//!
//! All backends implement the [`Datastore`] trait:
//!
//! - [`RedbDatastore`] -- durable, backed by an embedded redb database
//! - [`InMemoryDatastore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. A data mutation and its journal record commit together or not at all.
//! 2. Journal records are append-only and never rewritten.
//! 3. Journal sequence numbers start at 1 and have no gaps.
//! 4. Cursors read from a snapshot taken when they are opened.
//! 5. Absence is a value (`Ok(None)`), never an error.

pub mod audit;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod journal;
pub mod memory;
pub mod tables;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use audit::{verify_journal, JournalReport, KeyState, PinAudit};
pub use cursor::{CursorOp, JournalCursor, JournalSnapshot};
pub use engine::{EngineOptions, RedbDatastore, SyncPolicy};
pub use error::{StoreError, StoreResult};
pub use journal::{JournalRecord, Operation};
pub use memory::InMemoryDatastore;
pub use traits::Datastore;
