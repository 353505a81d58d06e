use std::iter::FusedIterator;

use tracing::debug;

use crate::error::StoreResult;
use crate::journal::JournalRecord;

/// Positioning operation for [`JournalCursor::get`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorOp {
    /// Position at the oldest record.
    First,
    /// Advance past the current record.
    Next,
    /// Position at the newest record.
    Last,
    /// Step back before the current record.
    Prev,
}

/// A read-only view of the journal, frozen when the cursor was opened.
///
/// Backends implement this over whatever snapshot mechanism they have (a
/// read transaction, a cloned map). Lookups are by sequence number.
pub trait JournalSnapshot {
    /// The record with the smallest sequence.
    fn first(&self) -> StoreResult<Option<JournalRecord>>;

    /// The record with the largest sequence.
    fn last(&self) -> StoreResult<Option<JournalRecord>>;

    /// The first record with a sequence strictly greater than `sequence`.
    fn after(&self, sequence: u64) -> StoreResult<Option<JournalRecord>>;

    /// The last record with a sequence strictly smaller than `sequence`.
    fn before(&self, sequence: u64) -> StoreResult<Option<JournalRecord>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    Unpositioned,
    At(u64),
    Exhausted,
}

/// Single-use traversal handle over journal records.
///
/// A cursor is bound to one snapshot: records committed after it was opened
/// are not visible. Once a step runs off either end the cursor is exhausted
/// and `Next`/`Prev` keep returning `None`; only `First` or `Last` position
/// it again.
///
/// Iterating the cursor is equivalent to calling `get(CursorOp::Next)` until
/// it returns `None`.
pub struct JournalCursor {
    snapshot: Box<dyn JournalSnapshot>,
    position: Position,
}

impl JournalCursor {
    /// Open a cursor over a snapshot.
    pub fn new(snapshot: Box<dyn JournalSnapshot>) -> Self {
        Self {
            snapshot,
            position: Position::Unpositioned,
        }
    }

    /// Move the cursor and return the record it lands on.
    ///
    /// `Next` on a fresh cursor behaves as `First`, and `Prev` as `Last`.
    /// An error also exhausts the cursor.
    pub fn get(&mut self, op: CursorOp) -> StoreResult<Option<JournalRecord>> {
        let result = match (op, self.position) {
            (CursorOp::First, _) | (CursorOp::Next, Position::Unpositioned) => {
                self.snapshot.first()
            }
            (CursorOp::Last, _) | (CursorOp::Prev, Position::Unpositioned) => {
                self.snapshot.last()
            }
            (CursorOp::Next, Position::At(seq)) => self.snapshot.after(seq),
            (CursorOp::Prev, Position::At(seq)) => self.snapshot.before(seq),
            (CursorOp::Next | CursorOp::Prev, Position::Exhausted) => Ok(None),
        };

        match result {
            Ok(Some(record)) => {
                self.position = Position::At(record.sequence);
                Ok(Some(record))
            }
            Ok(None) => {
                if self.position != Position::Exhausted {
                    debug!(?op, "journal cursor exhausted");
                }
                self.position = Position::Exhausted;
                Ok(None)
            }
            Err(e) => {
                self.position = Position::Exhausted;
                Err(e)
            }
        }
    }

    /// Returns `true` once the cursor has run off the end.
    pub fn is_exhausted(&self) -> bool {
        self.position == Position::Exhausted
    }

    /// Sequence of the record the cursor is positioned on, if any.
    pub fn current_sequence(&self) -> Option<u64> {
        match self.position {
            Position::At(seq) => Some(seq),
            _ => None,
        }
    }
}

impl Iterator for JournalCursor {
    type Item = StoreResult<JournalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_exhausted() {
            return None;
        }
        self.get(CursorOp::Next).transpose()
    }
}

impl FusedIterator for JournalCursor {}

impl std::fmt::Debug for JournalCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalCursor")
            .field("position", &self.position)
            .finish()
    }
}
