//! Journal replay: pin audits and structural verification.
//!
//! Both walk a [`JournalCursor`] from the oldest record forward and derive
//! their result purely from the records, never from the live tables.

use std::collections::BTreeMap;

use cairn_types::{Key, Timestamp};
use tracing::{debug, warn};

use crate::cursor::{CursorOp, JournalCursor};
use crate::error::{StoreError, StoreResult};
use crate::journal::{JournalRecord, Operation};

/// State of one key as reconstructed from the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyState {
    /// Whether the key held content after its last record.
    pub present: bool,
    /// Pin state after its last record.
    pub pinned: bool,
    /// Sequence of the last record touching the key.
    pub last_sequence: u64,
    /// Timestamp of that record.
    pub last_timestamp: Timestamp,
}

/// Per-key pin and presence state replayed from the journal.
///
/// Used by garbage collection to decide which blocks must be kept: a block
/// survives if it is pinned, otherwise it is a collection candidate.
#[derive(Clone, Debug, Default)]
pub struct PinAudit {
    keys: BTreeMap<Key, KeyState>,
    records: u64,
}

impl PinAudit {
    /// An empty audit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay every record of the cursor's snapshot.
    pub fn from_cursor(cursor: &mut JournalCursor) -> StoreResult<Self> {
        let mut audit = Self::new();
        let mut next = cursor.get(CursorOp::First)?;
        while let Some(record) = next {
            audit.apply(&record);
            next = cursor.get(CursorOp::Next)?;
        }
        debug!(
            records = audit.records,
            keys = audit.keys.len(),
            "pin audit complete"
        );
        Ok(audit)
    }

    /// Fold one record into the audit.
    pub fn apply(&mut self, record: &JournalRecord) {
        let present = !matches!(record.operation, Operation::Delete);
        self.keys.insert(
            record.key.clone(),
            KeyState {
                present,
                pinned: present && record.pin,
                last_sequence: record.sequence,
                last_timestamp: record.timestamp,
            },
        );
        self.records += 1;
    }

    /// Replayed state of `key`, if the journal ever mentioned it.
    pub fn state(&self, key: &Key) -> Option<&KeyState> {
        self.keys.get(key)
    }

    /// Keys that are present and pinned, in key order.
    pub fn pinned(&self) -> impl Iterator<Item = &Key> {
        self.keys
            .iter()
            .filter(|(_, s)| s.present && s.pinned)
            .map(|(k, _)| k)
    }

    /// Keys that are present but not pinned, in key order.
    pub fn unpinned(&self) -> impl Iterator<Item = &Key> {
        self.keys
            .iter()
            .filter(|(_, s)| s.present && !s.pinned)
            .map(|(k, _)| k)
    }

    /// Number of records applied.
    pub fn records_seen(&self) -> u64 {
        self.records
    }
}

/// Summary of a full journal scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JournalReport {
    pub records: u64,
    pub first_sequence: Option<u64>,
    pub last_sequence: Option<u64>,
    pub puts: u64,
    pub deletes: u64,
    pub pins: u64,
}

/// Walk the whole journal and check its structure.
///
/// Every record must decode, sequences must start at 1 and increase by one,
/// and timestamps must never decrease. The first violation is returned as
/// [`StoreError::CorruptRecord`].
pub fn verify_journal(cursor: &mut JournalCursor) -> StoreResult<JournalReport> {
    let mut report = JournalReport::default();
    let mut previous: Option<JournalRecord> = None;

    let mut next = cursor.get(CursorOp::First)?;
    while let Some(record) = next {
        let expected = previous.as_ref().map_or(1, |p| p.sequence + 1);
        if record.sequence != expected {
            warn!(expected, found = record.sequence, "journal sequence gap");
            return Err(StoreError::CorruptRecord {
                sequence: record.sequence,
                reason: format!("expected sequence {expected}"),
            });
        }
        if let Some(prev) = &previous {
            if record.timestamp < prev.timestamp {
                warn!(sequence = record.sequence, "journal timestamp went backwards");
                return Err(StoreError::CorruptRecord {
                    sequence: record.sequence,
                    reason: format!(
                        "timestamp {} precedes {}",
                        record.timestamp, prev.timestamp
                    ),
                });
            }
        }

        match record.operation {
            Operation::Put => report.puts += 1,
            Operation::Delete => report.deletes += 1,
            Operation::Pin => report.pins += 1,
        }
        report.records += 1;
        if report.first_sequence.is_none() {
            report.first_sequence = Some(record.sequence);
        }
        report.last_sequence = Some(record.sequence);

        previous = Some(record);
        next = cursor.get(CursorOp::Next)?;
    }

    debug!(records = report.records, "journal verified");
    Ok(report)
}
