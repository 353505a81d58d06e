use std::fmt;

use cairn_types::{Key, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Kind of mutation a journal record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Block content was written under the key.
    Put,
    /// Block content was removed.
    Delete,
    /// The key's pin state was set to the record's `pin` flag.
    Pin,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => write!(f, "put"),
            Self::Delete => write!(f, "delete"),
            Self::Pin => write!(f, "pin"),
        }
    }
}

/// A single entry of the mutation journal.
///
/// On-disk format of the record value:
/// ```text
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
/// The record is stored under its `sequence`, so the engine's integer key
/// order is the order in which mutations were committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Position in the journal, starting at 1.
    pub sequence: u64,
    /// Key of the block the mutation applied to.
    pub key: Key,
    /// Commit time; never smaller than the previous record's.
    pub timestamp: Timestamp,
    /// Pin state of the key after the mutation.
    pub pin: bool,
    /// What happened.
    pub operation: Operation,
}

/// Header size: 4 bytes CRC.
const HEADER_SIZE: usize = 4;

impl JournalRecord {
    /// Build the record that follows `previous` in the journal.
    pub fn next_after(
        previous: Option<&JournalRecord>,
        key: Key,
        pin: bool,
        operation: Operation,
    ) -> Self {
        let (sequence, floor) = match previous {
            Some(prev) => (prev.sequence + 1, prev.timestamp),
            None => (1, Timestamp::zero()),
        };
        Self {
            sequence,
            key,
            timestamp: Timestamp::monotonic_after(floor),
            pin,
            operation,
        }
    }

    /// Serialize with CRC framing.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let payload =
            bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let crc = crc32fast::hash(&payload);

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode a record stored under `sequence`.
    ///
    /// Fails with [`StoreError::CorruptRecord`] if the frame is truncated, the
    /// checksum does not match, the payload does not decode, or the payload
    /// claims a different sequence than the one it is stored under.
    pub fn decode(sequence: u64, bytes: &[u8]) -> StoreResult<Self> {
        let corrupt = |reason: String| StoreError::CorruptRecord { sequence, reason };

        if bytes.len() <= HEADER_SIZE {
            return Err(corrupt(format!("truncated record of {} bytes", bytes.len())));
        }
        let (header, payload) = bytes.split_at(HEADER_SIZE);
        let expected = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let actual = crc32fast::hash(payload);
        if actual != expected {
            return Err(corrupt(format!(
                "CRC mismatch: expected {expected:#010x}, got {actual:#010x}"
            )));
        }

        let record: JournalRecord =
            bincode::deserialize(payload).map_err(|e| corrupt(e.to_string()))?;
        if record.sequence != sequence {
            return Err(corrupt(format!(
                "record claims sequence {}",
                record.sequence
            )));
        }
        Ok(record)
    }
}
