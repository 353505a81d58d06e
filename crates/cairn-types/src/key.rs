use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length in characters of every textual key (a 32-byte digest, hex-encoded).
pub const KEY_LEN: usize = 64;

/// Content-derived address of a block.
///
/// A `Key` is the lowercase hexadecimal encoding of a 32-byte content digest.
/// The textual form is part of the persisted format: keys are stored verbatim
/// in the blockstore and in every journal record, so the alphabet (`0-9a-f`),
/// the absence of padding and the fixed length of [`KEY_LEN`] characters are
/// enforced on every construction path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Parse and validate a textual key.
    pub fn parse(text: impl Into<String>) -> Result<Self, TypeError> {
        let text = text.into();
        validate(text.as_bytes())?;
        Ok(Self(text))
    }

    /// Encode a 32-byte digest as a key.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    /// Validate raw key bytes as read back from storage.
    pub fn from_utf8_bytes(bytes: &[u8]) -> Result<Self, TypeError> {
        validate(bytes)?;
        // validate() only admits ASCII hex digits
        Ok(Self(bytes.iter().map(|&b| b as char).collect()))
    }

    /// The key as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as raw ASCII bytes (the form used as an engine key).
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Short form for log lines (first 8 characters).
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

fn validate(bytes: &[u8]) -> Result<(), TypeError> {
    if bytes.len() != KEY_LEN {
        return Err(TypeError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        });
    }
    if let Some((position, &b)) = bytes
        .iter()
        .enumerate()
        .find(|(_, b)| !matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return Err(TypeError::InvalidKeyCharacter {
            position,
            character: b as char,
        });
    }
    Ok(())
}

impl FromStr for Key {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Key {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.short())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
